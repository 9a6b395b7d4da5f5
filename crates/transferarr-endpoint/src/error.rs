//! Endpoint client error primitives.

use std::error::Error;

use thiserror::Error;

/// Error returned by an [`crate::EndpointClient`] implementation.
///
/// The orchestrator only reacts to the `Transient`/`Fatal` split: a
/// transient failure is logged and retried on the next tick, a fatal one is
/// surfaced onto the torrent record and never retried automatically.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// A connection, timeout, or other recoverable failure. Safe to retry
    /// on the next tick without operator intervention.
    #[error("{operation} failed transiently against endpoint {endpoint}")]
    Transient {
        /// Name of the endpoint the call was made against.
        endpoint: String,
        /// Operation identifier, for logs and metrics labels.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// A failure the orchestrator should not retry automatically.
    #[error("{operation} failed against endpoint {endpoint}")]
    Fatal {
        /// Name of the endpoint the call was made against.
        endpoint: String,
        /// Operation identifier, for logs and metrics labels.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// The referenced hash is not known to this endpoint.
    #[error("hash {hash} not found on endpoint {endpoint}")]
    NotFound {
        /// Name of the endpoint queried.
        endpoint: String,
        /// Info hash that was not found.
        hash: String,
    },
}

impl EndpointError {
    /// True when the orchestrator should retry this call on the next tick
    /// rather than surface it on the torrent record.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result wrapper for endpoint client operations.
pub type EndpointResult<T> = Result<T, EndpointError>;
