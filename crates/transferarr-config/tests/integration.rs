use transferarr_config::{ConfigError, load};

fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("transferarr.json");
    std::fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn loads_connections_with_sftp_transport() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_config(
        &dir,
        r#"{
            "media_managers": [
                {"kind": "movies", "host": "radarr", "port": 7878, "api_key": "key"},
                {"kind": "series", "host": "sonarr", "port": 8989, "api_key": "key"}
            ],
            "download_clients": {
                "seedbox": {"kind": "transmission", "connection_kind": "https", "host": "seedbox.example", "port": 443, "username": "u", "password": "p"},
                "home": {"kind": "qbittorrent", "connection_kind": "http", "host": "localhost", "port": 8080}
            },
            "connections": {
                "seedbox-to-home": {
                    "from": "seedbox",
                    "to": "home",
                    "transfer_config": {
                        "from": {"kind": "sftp", "host": "seedbox.example", "port": 22, "username": "u", "password": "p"},
                        "to": {"kind": "local"}
                    },
                    "source_metainfo_dir": "/torrents",
                    "source_payload_dir": "/data/complete",
                    "target_metainfo_tmp_dir": "/watch",
                    "target_payload_dir": "/data/complete"
                }
            },
            "tunables": {"worker_count": 5, "k_unclaimed": 20}
        }"#,
    );

    let config = load(&path).expect("load");
    assert_eq!(config.media_managers.len(), 2);
    assert_eq!(config.download_clients.len(), 2);
    let connection = &config.connections["seedbox-to-home"];
    assert_eq!(connection.from, "seedbox");
    assert_eq!(connection.to, "home");
    assert_eq!(config.tunables.worker_count, 5);
    assert_eq!(config.tunables.k_unclaimed, 20);
    assert_eq!(config.tunables.k_copy_retry, 3, "unset tunables keep their default");
}

#[test]
fn rejects_connection_between_same_download_client() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_config(
        &dir,
        r#"{
            "media_managers": [],
            "download_clients": {
                "home": {"kind": "qbittorrent", "connection_kind": "http", "host": "localhost", "port": 8080}
            },
            "connections": {
                "loopback": {
                    "from": "home",
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

    let err = load(&path).expect_err("same from/to must fail validation");
    assert!(matches!(err, ConfigError::Validation { .. }));
}
