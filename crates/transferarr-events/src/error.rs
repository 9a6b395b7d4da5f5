//! History sink error primitives.

use thiserror::Error;

/// Error emitted by a [`crate::HistorySink`] implementation.
///
/// Sinks are best-effort by contract (see `HistorySink`): callers log and
/// discard this rather than letting it affect the driver loop.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to append history event to {path}")]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise history event")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

/// Result wrapper for history sink operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
