//! Copy-job error primitives.

use thiserror::Error;

use transferarr_endpoint::EndpointError;
use transferarr_transport::TransportError;

/// A failure that terminates one copy job.
///
/// Distinguished from [`TransportError`]/[`EndpointError`] because it is
/// the classification the orchestrator actually acts on: `CopyFailed`
/// counts against a record's retry budget, `MetainfoMissing` sends the
/// record straight to `ERROR` with no retry.
#[derive(Debug, Error)]
pub enum JobError {
    /// The payload copy failed even after the one in-job retry allows.
    /// Counts against `K_COPY_RETRY`.
    #[error("copy failed for {hash}: {source}")]
    CopyFailed {
        /// Info hash the job was copying.
        hash: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The source metainfo file for this hash could not be found or read.
    /// Never retried; the record moves straight to `ERROR`.
    #[error("metainfo missing for {hash}: {source}")]
    MetainfoMissing {
        /// Info hash the job was copying.
        hash: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The target endpoint rejected `add_metainfo`. Treated like a copy
    /// failure: counts against `K_COPY_RETRY` rather than failing
    /// immediately, since a transient target outage is indistinguishable
    /// from a real rejection at this layer.
    #[error("add_metainfo failed for {hash}: {source}")]
    AddMetainfoFailed {
        /// Info hash the job was copying.
        hash: String,
        /// Underlying endpoint failure.
        #[source]
        source: EndpointError,
    },
}

impl JobError {
    /// The info hash the failing job was processing.
    #[must_use]
    pub fn hash(&self) -> &str {
        match self {
            Self::CopyFailed { hash, .. }
            | Self::MetainfoMissing { hash, .. }
            | Self::AddMetainfoFailed { hash, .. } => hash,
        }
    }

    /// Whether this failure should send the record straight to `ERROR`
    /// without counting against (or waiting on) the copy retry budget.
    #[must_use]
    pub const fn is_immediately_fatal(&self) -> bool {
        matches!(self, Self::MetainfoMissing { .. })
    }
}

/// Result wrapper for one copy job.
pub type JobResult<T> = Result<T, JobError>;

/// Returned by [`crate::Executor::try_enqueue`] when the bounded queue has
/// no free capacity. The orchestrator leaves the record in `HOME_SEEDING`
/// and retries enqueueing on the next tick.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("executor queue is saturated")]
pub struct QueueFullError;
