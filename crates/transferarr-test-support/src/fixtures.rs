//! Fakes and builders shared across integration suites: an in-memory
//! endpoint, an in-memory media-manager adapter, a scratch state directory,
//! and environment probes.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use async_trait::async_trait;
use transferarr_endpoint::{
    AddMetainfoOptions, EndpointClient, EndpointResult, EndpointState, TorrentSummary,
};
use transferarr_manager::{ManagerResult, MediaManagerAdapter, QueueItem};
use transferarr_record::{InfoHash, TorrentRecord, TorrentStore};

/// Returns `true` if a Docker daemon is reachable for integration tests.
#[must_use]
pub fn docker_available() -> bool {
    docker_available_with_host(std::env::var("DOCKER_HOST").ok())
}

fn docker_available_with_host(host: Option<String>) -> bool {
    if let Some(host) = host {
        if let Some(path) = host.strip_prefix("unix://") {
            return Path::new(path).exists();
        }
        return true;
    }

    Path::new("/var/run/docker.sock").exists()
        || Command::new("docker")
            .args(["info"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
}

/// Builds a 40-character hex info hash from a short seed, right-padding
/// with zeroes, so tests can write `hash_from_seed("a")` instead of
/// spelling out forty digits by hand.
#[must_use]
pub fn hash_from_seed(seed: &str) -> InfoHash {
    let mut raw = seed.to_string();
    raw.push_str(&"0".repeat(40usize.saturating_sub(raw.len())));
    raw.truncate(40);
    InfoHash::parse(&raw).expect("seed produces a valid info hash")
}

/// A manager-queued [`TorrentRecord`] with otherwise-default fields, for
/// tests that only care about one or two fields and want everything else
/// filled in sensibly.
#[must_use]
pub fn sample_record(seed: &str, manager_kind: &str) -> TorrentRecord {
    TorrentRecord::new_manager_queued(
        hash_from_seed(seed),
        format!("Sample.Torrent.{seed}"),
        manager_kind.to_string(),
        format!("queue-{seed}"),
    )
}

/// Opens a [`TorrentStore`] backed by a fresh temporary directory. The
/// directory is returned alongside the store so the caller can keep it
/// alive for the duration of the test (dropping it deletes the state file).
///
/// # Panics
///
/// Panics if the temporary directory or the store cannot be created.
pub async fn open_temp_store() -> (tempfile::TempDir, TorrentStore) {
    let dir = tempfile::tempdir().expect("create temp state dir");
    let store = TorrentStore::open(dir.path())
        .await
        .expect("open torrent store");
    (dir, store)
}

/// An in-memory [`EndpointClient`] whose torrent set and failure mode a
/// test can mutate directly, standing in for a real qBittorrent or
/// Transmission instance.
pub struct FakeEndpoint {
    name: String,
    torrents: Mutex<HashMap<String, TorrentSummary>>,
    fail_next: Mutex<bool>,
}

impl FakeEndpoint {
    /// Creates an empty endpoint registered under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            torrents: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(false),
        }
    }

    /// Makes the endpoint appear to hold `hash` in `state`, as if a real
    /// client had picked it up.
    pub fn seed(&self, hash: &str, state: EndpointState) {
        let hash = hash.to_ascii_lowercase();
        self.torrents.lock().unwrap_or_else(|err| err.into_inner()).insert(
            hash.clone(),
            TorrentSummary {
                hash,
                name: "fake-torrent".to_string(),
                state,
                files: Vec::new(),
            },
        );
    }

    /// Removes `hash`, as if it disappeared from the client without going
    /// through [`EndpointClient::remove`].
    pub fn drop_torrent(&self, hash: &str) {
        self.torrents
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&hash.to_ascii_lowercase());
    }

    /// Makes the next call that can fail return
    /// [`transferarr_endpoint::EndpointError::Transient`].
    pub fn fail_next_call(&self) {
        *self.fail_next.lock().unwrap_or_else(|err| err.into_inner()) = true;
    }

    fn take_failure(&self) -> bool {
        let mut flag = self.fail_next.lock().unwrap_or_else(|err| err.into_inner());
        std::mem::replace(&mut *flag, false)
    }
}

#[async_trait]
impl EndpointClient for FakeEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_connected(&self) -> EndpointResult<()> {
        if self.take_failure() {
            return Err(transferarr_endpoint::EndpointError::Transient {
                endpoint: self.name.clone(),
                operation: "ensure_connected",
                source: Box::new(std::io::Error::other("fake failure")),
            });
        }
        Ok(())
    }

    async fn list(&self) -> EndpointResult<HashMap<String, TorrentSummary>> {
        if self.take_failure() {
            return Err(transferarr_endpoint::EndpointError::Transient {
                endpoint: self.name.clone(),
                operation: "list",
                source: Box::new(std::io::Error::other("fake failure")),
            });
        }
        Ok(self
            .torrents
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone())
    }

    async fn add_metainfo(
        &self,
        _metainfo: &[u8],
        _options: AddMetainfoOptions,
    ) -> EndpointResult<()> {
        if self.take_failure() {
            return Err(transferarr_endpoint::EndpointError::Fatal {
                endpoint: self.name.clone(),
                operation: "add_metainfo",
                source: Box::new(std::io::Error::other("fake rejection")),
            });
        }
        Ok(())
    }

    async fn remove(&self, hash: &str, _delete_data: bool) -> EndpointResult<()> {
        self.drop_torrent(hash);
        Ok(())
    }
}

/// An in-memory [`MediaManagerAdapter`] whose queue and ingest readiness a
/// test can control directly.
pub struct FakeMediaManager {
    kind: &'static str,
    items: Mutex<Vec<QueueItem>>,
    ready: Mutex<HashMap<String, bool>>,
}

impl FakeMediaManager {
    /// Creates an adapter reporting `kind` with an empty queue.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: Mutex::new(Vec::new()),
            ready: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `item` to the manager's queue.
    pub fn enqueue(&self, item: QueueItem) {
        self.items.lock().unwrap_or_else(|err| err.into_inner()).push(item);
    }

    /// Removes every queue entry with `queue_id`, as a manager does once
    /// the user or an automatic import clears it.
    pub fn dequeue(&self, queue_id: &str) {
        self.items
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .retain(|item| item.queue_id != queue_id);
    }

    /// Marks `queue_id` as ready for the orchestrator to retire the source
    /// copy.
    pub fn mark_ready(&self, queue_id: &str) {
        self.ready
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(queue_id.to_string(), true);
    }
}

#[async_trait]
impl MediaManagerAdapter for FakeMediaManager {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn queue(&self) -> ManagerResult<Vec<QueueItem>> {
        Ok(self.items.lock().unwrap_or_else(|err| err.into_inner()).clone())
    }

    async fn ready_to_remove(&self, queue_id: &str) -> ManagerResult<bool> {
        Ok(*self
            .ready
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(queue_id)
            .unwrap_or(&false))
    }
}
