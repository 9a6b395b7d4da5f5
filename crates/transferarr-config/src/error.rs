//! Configuration loading and validation errors.

use std::path::PathBuf;

use thiserror::Error;

/// Error returned while loading or validating the process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read configuration file {path}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON, or does not match the
    /// expected schema.
    #[error("configuration file {path} is not valid")]
    Parse {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying deserialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but failed a semantic check.
    #[error("invalid configuration: {message}")]
    Validation {
        /// Human-readable description of the violated rule.
        message: String,
    },
}

/// Result wrapper for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
