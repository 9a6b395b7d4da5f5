//! State store error primitives.

use thiserror::Error;

/// Error returned while loading or saving the persisted torrent state.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The state file could not be read or written. Saving is fatal to the
    /// process; loading is recoverable (the store starts empty).
    #[error("io failure on state file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but could not be parsed as JSON. Recoverable
    /// on load: the caller logs and starts from an empty store.
    #[error("state file {path} is not valid JSON")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A save could not be completed even after the store retried the
    /// temp-file-plus-rename sequence. Fatal to the process.
    #[error("state file {path} could not be written")]
    Unwritable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result wrapper for state store operations.
pub type StateStoreResult<T> = Result<T, StateStoreError>;
