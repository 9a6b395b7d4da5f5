//! Semantic validation of a loaded configuration document.

use crate::error::ConfigError;
use crate::model::{KIND_MOVIES, KIND_SERIES, RawConfig};

/// Checks the cross-field rules a [`RawConfig`] must satisfy beyond what
/// `serde` already enforces: every connection names endpoints that exist,
/// `from` differs from `to`, and every media-manager kind is recognised.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first rule violated.
pub fn validate(config: &RawConfig) -> Result<(), ConfigError> {
    for manager in &config.media_managers {
        if manager.kind != KIND_MOVIES && manager.kind != KIND_SERIES {
            return Err(ConfigError::Validation {
                message: format!(
                    "media manager at {}:{} has unknown kind '{}'",
                    manager.host, manager.port, manager.kind
                ),
            });
        }
    }

    for (name, connection) in &config.connections {
        if connection.from == connection.to {
            return Err(ConfigError::Validation {
                message: format!(
                    "connection '{name}' names '{}' as both its source and target",
                    connection.from
                ),
            });
        }
        if !config.download_clients.contains_key(&connection.from) {
            return Err(ConfigError::Validation {
                message: format!(
                    "connection '{name}' refers to unregistered download client '{}'",
                    connection.from
                ),
            });
        }
        if !config.download_clients.contains_key(&connection.to) {
            return Err(ConfigError::Validation {
                message: format!(
                    "connection '{name}' refers to unregistered download client '{}'",
                    connection.to
                ),
            });
        }
    }

    if config.tunables.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "tunables.worker_count must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use transferarr_transport::TransportDescriptor;

    use super::*;
    use crate::model::{ConnectionConfig, DownloadClientConfig, MediaManagerConfig, TransferConfig};

    fn download_client() -> DownloadClientConfig {
        DownloadClientConfig {
            kind: "qbittorrent".to_string(),
            connection_kind: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            username: None,
            password: None,
        }
    }

    fn connection(from: &str, to: &str) -> ConnectionConfig {
        ConnectionConfig {
            from: from.to_string(),
            to: to.to_string(),
            transfer_config: TransferConfig {
                from: TransportDescriptor::Local,
                to: TransportDescriptor::Local,
            },
            source_metainfo_dir: "/torrents".into(),
            source_payload_dir: "/data".into(),
            target_metainfo_tmp_dir: "/watch".into(),
            target_payload_dir: "/data".into(),
        }
    }

    fn base_config() -> RawConfig {
        let mut download_clients = HashMap::new();
        download_clients.insert("seedbox".to_string(), download_client());
        download_clients.insert("home".to_string(), download_client());
        RawConfig {
            media_managers: vec![],
            download_clients,
            connections: HashMap::new(),
            tunables: Default::default(),
        }
    }

    #[test]
    fn accepts_well_formed_config() {
        let mut config = base_config();
        config
            .connections
            .insert("main".to_string(), connection("seedbox", "home"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_same_endpoint_connection() {
        let mut config = base_config();
        config
            .connections
            .insert("main".to_string(), connection("seedbox", "seedbox"));
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn rejects_connection_with_unknown_endpoint() {
        let mut config = base_config();
        config
            .connections
            .insert("main".to_string(), connection("seedbox", "ghost"));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_manager_kind() {
        let mut config = base_config();
        config.media_managers.push(MediaManagerConfig {
            kind: "music".to_string(),
            host: "localhost".to_string(),
            port: 7878,
            api_key: "key".to_string(),
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_worker_count() {
        let mut config = base_config();
        config.tunables.worker_count = 0;
        assert!(validate(&config).is_err());
    }
}
