//! Orchestrator construction errors.

use thiserror::Error;

/// Error raised while assembling an [`crate::Orchestrator`] from its
/// registered endpoints, managers, and connections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// A connection names the same endpoint as both its source and target.
    #[error("connection '{name}' names '{endpoint}' as both its source and target")]
    SameEndpoint {
        /// The offending connection's configured name.
        name: String,
        /// The endpoint named on both sides.
        endpoint: String,
    },

    /// A connection refers to an endpoint that was never registered.
    #[error("connection '{name}' refers to unregistered endpoint '{endpoint}'")]
    UnknownEndpoint {
        /// The offending connection's configured name.
        name: String,
        /// The endpoint name that has no matching registration.
        endpoint: String,
    },
}

/// Result wrapper for orchestrator construction.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
