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

//! Uniform capability surface over a torrent client.
//!
//! The orchestrator never interprets a client's native state or wire
//! format; every adapter translates into [`EndpointState`] at the boundary.

pub mod error;
pub mod qbittorrent;
pub mod transmission;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{EndpointError, EndpointResult};
pub use qbittorrent::QBittorrentEndpoint;
pub use transmission::TransmissionEndpoint;

/// The universal torrent-client state set, shared by every endpoint role.
///
/// The orchestrator tags a value of this enum with whether it was observed
/// on the torrent's home or target client to get the `HOME_*`/`TARGET_*`
/// states from the state-transition table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    /// Added but not yet verifying or transferring data.
    Queued,
    /// Verifying already-downloaded pieces.
    Checking,
    /// Actively fetching payload.
    Downloading,
    /// Complete and uploading to peers.
    Seeding,
    /// Present but paused by the client or an operator.
    Paused,
    /// The client reports the torrent itself is in an error state.
    Error,
}

impl EndpointState {
    /// Whether this state belongs to the "downloading-like" partition
    /// (queued, checking, downloading are all pre-completion).
    #[must_use]
    pub const fn is_downloading_like(self) -> bool {
        matches!(self, Self::Queued | Self::Checking | Self::Downloading)
    }

    /// Whether this state belongs to the "seeding-like" partition.
    #[must_use]
    pub const fn is_seeding_like(self) -> bool {
        matches!(self, Self::Seeding | Self::Paused)
    }

    /// Stable uppercase label used as the suffix of a `HOME_*`/`TARGET_*`
    /// torrent-record state label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Checking => "CHECKING",
            Self::Downloading => "DOWNLOADING",
            Self::Seeding => "SEEDING",
            Self::Paused => "PAUSED",
            Self::Error => "ERROR",
        }
    }

    /// Parses a label produced by [`Self::label`].
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "QUEUED" => Some(Self::Queued),
            "CHECKING" => Some(Self::Checking),
            "DOWNLOADING" => Some(Self::Downloading),
            "SEEDING" => Some(Self::Seeding),
            "PAUSED" => Some(Self::Paused),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One file within a torrent's payload, as reported by an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentFileEntry {
    /// Path relative to the torrent's payload root.
    pub path: String,
    /// Total size in bytes.
    pub size_bytes: u64,
}

/// Snapshot of one torrent as seen by an endpoint's `list()` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentSummary {
    /// Lower-case 40-character info hash.
    pub hash: String,
    /// Display name as reported by the client.
    pub name: String,
    /// Native state, already mapped into the universal set.
    pub state: EndpointState,
    /// File listing, when the client can report one.
    pub files: Vec<TorrentFileEntry>,
}

/// Options accompanying an `add_metainfo` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMetainfoOptions {
    /// Directory the endpoint should save the payload into.
    pub save_path: String,
    /// Whether the torrent should be added in a paused state.
    pub paused: bool,
}

/// Uniform capability surface over a torrent-client instance.
///
/// All operations are thread-safe and may be called concurrently by the
/// driver and by executor workers.
#[async_trait]
pub trait EndpointClient: Send + Sync {
    /// Stable name this endpoint is registered under.
    fn name(&self) -> &str;

    /// Idempotent connectivity check. Transient failures here never block
    /// the tick that invoked it; the driver simply treats the endpoint as
    /// momentarily unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Transient`] on connection failure.
    async fn ensure_connected(&self) -> EndpointResult<()>;

    /// Snapshot of every torrent currently known to the endpoint, keyed by
    /// lower-case info hash.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Transient`] on connection or timeout
    /// failure.
    async fn list(&self) -> EndpointResult<HashMap<String, TorrentSummary>>;

    /// Whether `hash` is currently present on this endpoint.
    ///
    /// The default implementation derives this from [`Self::list`];
    /// implementations may override it with a cheaper lookup.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::list`].
    async fn has(&self, hash: &str) -> EndpointResult<bool> {
        let hash = hash.to_ascii_lowercase();
        Ok(self.list().await?.contains_key(&hash))
    }

    /// Add a torrent described by `metainfo` bytes. Idempotent by hash: if
    /// the endpoint already has the torrent this is a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Transient`] or [`EndpointError::Fatal`]
    /// depending on the underlying failure.
    async fn add_metainfo(
        &self,
        metainfo: &[u8],
        options: AddMetainfoOptions,
    ) -> EndpointResult<()>;

    /// Remove `hash` from the endpoint, optionally deleting its on-disk
    /// data. "Not present" is treated as success, never as an error.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Transient`] or [`EndpointError::Fatal`]
    /// depending on the underlying failure.
    async fn remove(&self, hash: &str, delete_data: bool) -> EndpointResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct StubEndpoint {
        name: String,
        torrents: Mutex<HashMap<String, TorrentSummary>>,
    }

    #[async_trait]
    impl EndpointClient for StubEndpoint {
        fn name(&self) -> &str {
            &self.name
        }

        async fn ensure_connected(&self) -> EndpointResult<()> {
            Ok(())
        }

        async fn list(&self) -> EndpointResult<HashMap<String, TorrentSummary>> {
            Ok(self.torrents.lock().await.clone())
        }

        async fn add_metainfo(
            &self,
            _metainfo: &[u8],
            _options: AddMetainfoOptions,
        ) -> EndpointResult<()> {
            let mut torrents = self.torrents.lock().await;
            torrents
                .entry("a".repeat(40))
                .or_insert_with(|| TorrentSummary {
                    hash: "a".repeat(40),
                    name: "added".to_string(),
                    state: EndpointState::Queued,
                    files: Vec::new(),
                });
            Ok(())
        }

        async fn remove(&self, hash: &str, _delete_data: bool) -> EndpointResult<()> {
            self.torrents.lock().await.remove(hash);
            Ok(())
        }
    }

    fn stub() -> StubEndpoint {
        StubEndpoint {
            name: "stub".to_string(),
            torrents: Mutex::new(HashMap::new()),
        }
    }

    #[tokio::test]
    async fn has_derives_from_list_by_default() {
        let endpoint = stub();
        assert!(!endpoint.has(&"a".repeat(40)).await.unwrap());

        endpoint
            .add_metainfo(&[], AddMetainfoOptions {
                save_path: "/data".to_string(),
                paused: false,
            })
            .await
            .unwrap();

        assert!(endpoint.has(&"a".repeat(40)).await.unwrap());
    }

    #[tokio::test]
    async fn add_metainfo_is_idempotent() {
        let endpoint = stub();
        let options = || AddMetainfoOptions {
            save_path: "/data".to_string(),
            paused: false,
        };
        endpoint.add_metainfo(&[], options()).await.unwrap();
        endpoint.add_metainfo(&[], options()).await.unwrap();
        assert_eq!(endpoint.list().await.unwrap().len(), 1);
    }

    #[test]
    fn state_partitions_are_disjoint() {
        for state in [
            EndpointState::Queued,
            EndpointState::Checking,
            EndpointState::Downloading,
            EndpointState::Seeding,
            EndpointState::Paused,
            EndpointState::Error,
        ] {
            assert!(!(state.is_downloading_like() && state.is_seeding_like()));
        }
        assert!(EndpointState::Downloading.is_downloading_like());
        assert!(EndpointState::Seeding.is_seeding_like());
    }
}
