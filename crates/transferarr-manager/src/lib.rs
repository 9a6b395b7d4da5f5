#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Poll a media manager's download queue and confirm ingest completion.
//!
//! The orchestrator never interprets a manager's wire format directly;
//! every adapter translates into [`QueueItem`] at the boundary, same
//! discipline as `transferarr-endpoint`.

pub mod error;
pub mod radarr;
pub mod sonarr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{ManagerError, ManagerResult};
pub use radarr::{RadarrAdapter, RadarrConfig};
pub use sonarr::{SonarrAdapter, SonarrConfig};

/// Stable kind tags for the two adapters.
pub const KIND_MOVIES: &str = "movies";
/// Stable kind tag for the series adapter.
pub const KIND_SERIES: &str = "series";

/// One item currently present in a manager's download queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItem {
    /// Info hash as reported by the manager (managers tend to uppercase;
    /// the orchestrator lower-cases on ingest via `InfoHash`).
    pub hash: String,
    /// Display name, refreshed into the record on every sighting.
    pub name: String,
    /// Opaque identifier the manager uses to recognise this queue entry;
    /// passed back unchanged to [`MediaManagerAdapter::ready_to_remove`].
    pub queue_id: String,
}

/// Capability surface required from every media-manager implementation.
#[async_trait]
pub trait MediaManagerAdapter: Send + Sync {
    /// Stable string tag serialised onto every record this adapter owns,
    /// so the record can be rebound to the right adapter after a restart.
    fn kind(&self) -> &'static str;

    /// Current items whose download is this manager's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Transient`] on connection or timeout
    /// failure; the orchestrator skips this tick's ingest step for this
    /// adapter and retries on the next one.
    async fn queue(&self) -> ManagerResult<Vec<QueueItem>>;

    /// True once the manager has ingested the payload identified by
    /// `queue_id` and no longer needs the torrent kept around.
    ///
    /// A queue entry that has disappeared from [`Self::queue`] is itself
    /// never sufficient grounds for retirement: this call is the
    /// sole authority the orchestrator consults before removing the
    /// source copy.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Transient`] on connection or timeout
    /// failure.
    async fn ready_to_remove(&self, queue_id: &str) -> ManagerResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubAdapter {
        kind: &'static str,
        items: Vec<QueueItem>,
        ready: Mutex<std::collections::HashMap<String, bool>>,
    }

    #[async_trait]
    impl MediaManagerAdapter for StubAdapter {
        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn queue(&self) -> ManagerResult<Vec<QueueItem>> {
            Ok(self.items.clone())
        }

        async fn ready_to_remove(&self, queue_id: &str) -> ManagerResult<bool> {
            Ok(*self.ready.lock().unwrap().get(queue_id).unwrap_or(&false))
        }
    }

    #[tokio::test]
    async fn queue_returns_configured_items() {
        let adapter = StubAdapter {
            kind: KIND_MOVIES,
            items: vec![QueueItem {
                hash: "A".repeat(40),
                name: "Some.Movie".to_string(),
                queue_id: "42".to_string(),
            }],
            ready: Mutex::new(std::collections::HashMap::new()),
        };
        let queue = adapter.queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(adapter.kind(), KIND_MOVIES);
    }

    #[tokio::test]
    async fn ready_to_remove_defaults_to_false_for_unknown_ids() {
        let adapter = StubAdapter {
            kind: KIND_SERIES,
            items: Vec::new(),
            ready: Mutex::new(std::collections::HashMap::new()),
        };
        assert!(!adapter.ready_to_remove("missing").await.unwrap());
    }
}
