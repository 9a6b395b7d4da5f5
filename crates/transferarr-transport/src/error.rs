//! Transport error primitives.

use thiserror::Error;

/// Error returned by a [`crate::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Local filesystem I/O failure.
    #[error("io failure on {path} during {operation}")]
    Io {
        operation: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// SSH/SFTP session or protocol failure. Sessions are re-established
    /// and the operation retried at most once per tick; a second failure
    /// surfaces this.
    #[error("sftp failure on {path} during {operation}")]
    Sftp {
        operation: &'static str,
        path: String,
        #[source]
        source: ssh2::Error,
    },

    /// The `ssh_config_host` alias was not found in the referenced SSH
    /// client configuration file.
    #[error("ssh config host '{alias}' not found in {config_file}")]
    UnknownSshAlias { config_file: String, alias: String },

    /// The requested path does not exist on the remote/local filesystem.
    #[error("{path} not found")]
    NotFound { path: String },
}

impl TransportError {
    /// Whether the orchestrator/executor should treat this as retryable
    /// within the current job (a dropped session or transient I/O error)
    /// rather than an immediate, non-retryable copy failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Sftp { .. } | Self::Io { .. })
    }
}

/// Result wrapper for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
