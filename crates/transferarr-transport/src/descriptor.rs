//! Transport descriptors: the config-time shape of "how do I reach this
//! endpoint's filesystem".

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to reach an endpoint's filesystem, as configured on a connection's
/// `from`/`to` side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportDescriptor {
    /// The endpoint's files are directly visible on this host's
    /// filesystem.
    Local,
    /// The endpoint's files are reached over SFTP.
    Sftp(SftpDescriptor),
}

/// Addressing and credentials for an SFTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SftpDescriptor {
    /// Inline host, port and password credentials.
    ByHostCredentials {
        /// Hostname or IP address.
        host: String,
        /// Port, typically 22.
        port: u16,
        /// SSH/SFTP username.
        username: String,
        /// SSH/SFTP password.
        password: String,
    },
    /// Resolve host, port, user and identity file from a standard SSH
    /// client configuration file entry, authenticating with the
    /// referenced private key.
    BySshAlias {
        /// Path to an `ssh_config`-formatted file.
        ssh_config_file: PathBuf,
        /// `Host` alias to resolve within that file.
        ssh_config_host: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_descriptor_round_trips() {
        let descriptor = TransportDescriptor::Local;
        let json = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(json, r#"{"kind":"local"}"#);
    }

    #[test]
    fn sftp_by_host_credentials_round_trips() {
        let descriptor = TransportDescriptor::Sftp(SftpDescriptor::ByHostCredentials {
            host: "nas.local".to_string(),
            port: 22,
            username: "transferarr".to_string(),
            password: "hunter2".to_string(),
        });
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "sftp");
        assert_eq!(json["host"], "nas.local");
    }

    #[test]
    fn sftp_by_ssh_alias_round_trips() {
        let descriptor = TransportDescriptor::Sftp(SftpDescriptor::BySshAlias {
            ssh_config_file: PathBuf::from("/home/transferarr/.ssh/config"),
            ssh_config_host: "seedbox".to_string(),
        });
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "sftp");
        assert_eq!(json["ssh_config_host"], "seedbox");
    }
}
