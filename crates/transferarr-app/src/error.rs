//! Top-level application errors and their process exit codes.

use std::path::PathBuf;

use thiserror::Error;
use transferarr_config::ConfigError;
use transferarr_orchestrator::OrchestratorError;
use transferarr_record::StateStoreError;
use transferarr_transport::TransportError;

/// Configuration error exit code.
pub const EXIT_CONFIG_ERROR: i32 = 1;
/// Unrecoverable state-store error exit code.
pub const EXIT_STATE_STORE_ERROR: i32 = 2;

/// Errors that can end the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// The configuration file could not be loaded or failed validation.
    #[error("configuration error")]
    Config(#[from] ConfigError),

    /// The persisted state file could not be opened or written.
    #[error("state store error")]
    StateStore(#[from] StateStoreError),

    /// Assembling the orchestrator from the parsed configuration failed.
    #[error("orchestrator assembly error")]
    Orchestrator(#[from] OrchestratorError),

    /// Building an SFTP transport for a connection failed.
    #[error("transport error")]
    Transport(#[from] TransportError),

    /// A configured download client, media manager, or connection names an
    /// unsupported `kind`.
    #[error("unsupported kind '{kind}' for {field}")]
    UnsupportedKind {
        /// Field the unsupported value was read from, e.g.
        /// `download_clients.seedbox.kind`.
        field: String,
        /// The value that was not recognised.
        kind: String,
    },

    /// Installing the tracing subscriber failed.
    #[error("logging initialisation error")]
    Telemetry(#[from] transferarr_telemetry::TelemetryError),

    /// The history log could not be opened.
    #[error("could not open history log at {path}")]
    HistoryLog {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: transferarr_events::HistoryError,
    },
}

impl AppError {
    /// The process exit code this error should produce.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::UnsupportedKind { .. } => EXIT_CONFIG_ERROR,
            Self::StateStore(_) => EXIT_STATE_STORE_ERROR,
            Self::Orchestrator(_)
            | Self::Transport(_)
            | Self::Telemetry(_)
            | Self::HistoryLog { .. } => EXIT_CONFIG_ERROR,
        }
    }
}
