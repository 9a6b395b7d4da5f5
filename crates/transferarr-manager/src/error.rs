//! Media-manager adapter error primitives.

use std::error::Error;

use thiserror::Error;

/// Error returned by a [`crate::MediaManagerAdapter`] implementation.
///
/// Mirrors the `transferarr-endpoint` transient/fatal split: the
/// orchestrator retries a transient failure on the next tick and never
/// records it on a `TorrentRecord`.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A connection, timeout, or other recoverable failure.
    #[error("{operation} failed transiently against manager {manager}")]
    Transient {
        /// Name/kind of the manager the call was made against.
        manager: &'static str,
        /// Operation identifier, for logs and metrics labels.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// A failure the orchestrator should not retry automatically.
    #[error("{operation} failed against manager {manager}")]
    Fatal {
        /// Name/kind of the manager the call was made against.
        manager: &'static str,
        /// Operation identifier, for logs and metrics labels.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl ManagerError {
    /// Whether the orchestrator should retry this call on the next tick
    /// rather than treat it as a hard failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result wrapper for media-manager adapter operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;
    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }
    impl Error for Boom {}

    #[test]
    fn transient_is_reported_as_transient() {
        let err = ManagerError::Transient {
            manager: "movies",
            operation: "queue",
            source: Box::new(Boom),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn fatal_is_not_transient() {
        let err = ManagerError::Fatal {
            manager: "movies",
            operation: "queue",
            source: Box::new(Boom),
        };
        assert!(!err.is_transient());
    }
}
