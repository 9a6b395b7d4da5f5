//! Loads and validates the process configuration file.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::RawConfig;
use crate::validate;

/// Reads `path`, parses it as JSON, and validates the result.
///
/// Configuration is loaded once at startup; hot-reload is not supported.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read,
/// [`ConfigError::Parse`] if it is not valid JSON or does not match the
/// expected schema, or [`ConfigError::Validation`] if it fails a semantic
/// check.
pub fn load(path: &Path) -> ConfigResult<RawConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RawConfig =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("transferarr.json");
        std::fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn loads_well_formed_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            &dir,
            r#"{
                "media_managers": [
                    {"kind": "movies", "host": "radarr", "port": 7878, "api_key": "key"}
                ],
                "download_clients": {
                    "seedbox": {"kind": "qbittorrent", "connection_kind": "https", "host": "seedbox.example", "port": 8080, "username": "u", "password": "p"},
                    "home": {"kind": "transmission", "connection_kind": "http", "host": "localhost", "port": 9091}
                },
                "connections": {
                    "main": {
                        "from": "seedbox",
                        "to": "home",
                        "transfer_config": {"from": {"kind": "local"}, "to": {"kind": "local"}},
                        "source_metainfo_dir": "/torrents",
                        "source_payload_dir": "/data",
                        "target_metainfo_tmp_dir": "/watch",
                        "target_payload_dir": "/data"
                    }
                }
            }"#,
        );

        let config = load(&path).expect("load");
        assert_eq!(config.media_managers.len(), 1);
        assert_eq!(config.tunables.worker_count, 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::path::PathBuf::from("/nonexistent/transferarr.json");
        assert!(matches!(load(&path), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(&dir, "{not json");
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn semantic_violation_is_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            &dir,
            r#"{
                "media_managers": [],
                "download_clients": {
                    "seedbox": {"kind": "qbittorrent", "connection_kind": "http", "host": "h", "port": 1}
                },
                "connections": {
                    "main": {
                        "from": "seedbox",
                        "to": "seedbox",
                        "transfer_config": {"from": {"kind": "local"}, "to": {"kind": "local"}},
                        "source_metainfo_dir": "/torrents",
                        "source_payload_dir": "/data",
                        "target_metainfo_tmp_dir": "/watch",
                        "target_payload_dir": "/data"
                    }
                }
            }"#,
        );
        assert!(matches!(load(&path), Err(ConfigError::Validation { .. })));
    }
}
