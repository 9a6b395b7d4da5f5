//! Atomically-written JSON state store.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{StateStoreError, StateStoreResult};
use crate::model::{InfoHash, JobOutcome, ProgressView, TorrentRecord, TorrentState};

/// On-disk shape of the state file: `{ "torrents": { "<hash>": <record> } }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    torrents: HashMap<String, TorrentRecord>,
    /// Fields from a newer process version we don't understand yet.
    /// Round-tripped verbatim so upgrading and downgrading never loses data.
    #[serde(flatten)]
    unknown: serde_json::Map<String, serde_json::Value>,
}

/// Crash-safe, in-memory-cached store of every tracked [`TorrentRecord`].
///
/// Owned exclusively by the orchestrator driver; workers respect a
/// single-writer discipline for the fields they are allowed to touch.
pub struct TorrentStore {
    path: PathBuf,
    records: RwLock<HashMap<InfoHash, TorrentRecord>>,
    unknown_fields: RwLock<serde_json::Map<String, serde_json::Value>>,
}

impl TorrentStore {
    /// Opens the store at `state_dir/state.json`, loading any existing
    /// records. A missing, unreadable, or malformed file is recoverable:
    /// this logs and starts from an empty store rather than failing.
    ///
    /// # Errors
    ///
    /// Never returns `Err` today (load failures degrade rather than
    /// propagate), but returns `StateStoreResult` so a future stricter
    /// mode (e.g. "refuse to start on corrupt state") can be added without
    /// changing the signature.
    pub async fn open(state_dir: impl AsRef<Path>) -> StateStoreResult<Self> {
        let path = state_dir.as_ref().join("state.json");
        let (records, unknown) = Self::load_from_disk(&path);
        info!(path = %path.display(), count = records.len(), "loaded torrent state");
        Ok(Self {
            path,
            records: RwLock::new(records),
            unknown_fields: RwLock::new(unknown),
        })
    }

    fn load_from_disk(
        path: &Path,
    ) -> (
        HashMap<InfoHash, TorrentRecord>,
        serde_json::Map<String, serde_json::Value>,
    ) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no existing state file, starting empty");
                return (HashMap::new(), serde_json::Map::new());
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "could not read state file, starting empty");
                return (HashMap::new(), serde_json::Map::new());
            }
        };

        match serde_json::from_str::<StateDocument>(&raw) {
            Ok(document) => {
                let records = document
                    .torrents
                    .into_iter()
                    .filter_map(|(key, record)| match InfoHash::parse(&key) {
                        Ok(hash) => Some((hash, record)),
                        Err(error) => {
                            warn!(key, %error, "dropping state entry with invalid hash key");
                            None
                        }
                    })
                    .collect();
                (records, document.unknown)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "state file is not valid JSON, starting empty");
                (HashMap::new(), serde_json::Map::new())
            }
        }
    }

    /// Snapshot of every tracked record.
    pub async fn snapshot(&self) -> Vec<TorrentRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Looks up a single record by hash.
    pub async fn get(&self, hash: &InfoHash) -> Option<TorrentRecord> {
        self.records.read().await.get(hash).cloned()
    }

    /// Inserts or overwrites a record, then persists the whole store.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Unwritable`] if the durable write fails;
    /// this is fatal to the process.
    pub async fn upsert(&self, record: TorrentRecord) -> StateStoreResult<()> {
        {
            let mut records = self.records.write().await;
            records.insert(record.hash.clone(), record);
        }
        self.save().await
    }

    /// Removes a record (retirement or unclaimed-expiry), then persists.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Unwritable`] if the durable write fails.
    pub async fn remove(&self, hash: &InfoHash) -> StateStoreResult<()> {
        {
            let mut records = self.records.write().await;
            records.remove(hash);
        }
        self.save().await
    }

    /// Replaces the whole record set in one step (used by the driver at the
    /// end of a tick, after ingest/locate/advance have all run) and
    /// persists it.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Unwritable`] if the durable write fails.
    pub async fn replace_all(&self, records: Vec<TorrentRecord>) -> StateStoreResult<()> {
        {
            let mut guard = self.records.write().await;
            guard.clear();
            guard.extend(records.into_iter().map(|record| (record.hash.clone(), record)));
        }
        self.save().await
    }

    /// Publishes a new progress snapshot for `hash`, the one field an
    /// executor worker may write while a job is in flight. A hash the
    /// store no longer tracks (the driver dropped it mid-job) is silently
    /// ignored rather than treated as an error.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Unwritable`] if the durable write fails.
    pub async fn update_progress(&self, hash: &InfoHash, progress: ProgressView) -> StateStoreResult<()> {
        {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(hash) {
                record.progress_view = progress;
            }
        }
        self.save().await
    }

    /// Publishes the terminal outcome of one executor job for `hash`, the
    /// other field a worker may write. A [`JobOutcome::Completed`]
    /// transitions the record directly to [`TorrentState::Copied`]; a
    /// [`JobOutcome::Failed`] only attaches the error so the driver can
    /// apply the retry-budget logic that belongs to it alone on its next
    /// tick (see `transferarr-orchestrator`).
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Unwritable`] if the durable write fails.
    pub async fn report_job_outcome(&self, hash: &InfoHash, outcome: JobOutcome) -> StateStoreResult<()> {
        {
            let mut records = self.records.write().await;
            if let Some(record) = records.get_mut(hash) {
                match outcome {
                    JobOutcome::Completed => record.transition(TorrentState::Copied),
                    JobOutcome::Failed(error) => record.error = Some(error),
                }
            }
        }
        self.save().await
    }

    /// Applies an arbitrary read-modify-write to one record while holding
    /// the store's write lock for the whole operation.
    ///
    /// Every other mutating method on this store (including the worker-only
    /// [`Self::update_progress`]/[`Self::report_job_outcome`]) also takes
    /// this same lock for the duration of its own read-modify-write, so a
    /// driver-side `mutate` can never observe or clobber a half-applied
    /// worker write, and vice versa. `transferarr-orchestrator` uses this
    /// for every field it owns exclusively instead of a
    /// `get`-then-`upsert` pair, which would have a window for a
    /// concurrent worker write to be silently overwritten.
    ///
    /// `f` is not called, and no write is persisted, if `hash` is not
    /// tracked.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Unwritable`] if the durable write fails.
    pub async fn mutate<R>(
        &self,
        hash: &InfoHash,
        f: impl FnOnce(&mut TorrentRecord) -> R,
    ) -> StateStoreResult<Option<R>> {
        let result = {
            let mut records = self.records.write().await;
            records.get_mut(hash).map(f)
        };
        if result.is_some() {
            self.save().await?;
        }
        Ok(result)
    }

    async fn save(&self) -> StateStoreResult<()> {
        let document = {
            let records = self.records.read().await;
            let unknown = self.unknown_fields.read().await;
            StateDocument {
                torrents: records
                    .iter()
                    .map(|(hash, record)| (hash.as_str().to_string(), record.clone()))
                    .collect(),
                unknown: unknown.clone(),
            }
        };

        let serialized =
            serde_json::to_vec_pretty(&document).map_err(|source| StateStoreError::Corrupt {
                path: self.path.display().to_string(),
                source,
            })?;

        write_atomically(&self.path, &serialized).map_err(|source| StateStoreError::Unwritable {
            path: self.path.display().to_string(),
            source,
        })
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp_path = path.to_path_buf();
    let file_name = format!(
        ".{}.tmp",
        path.file_name().and_then(|name| name.to_str()).unwrap_or("state")
    );
    tmp_path.set_file_name(file_name);

    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TorrentState;

    fn sample_record(hash: &str) -> TorrentRecord {
        TorrentRecord::new_manager_queued(
            InfoHash::parse(hash).unwrap(),
            "Some.Movie".to_string(),
            "movies".to_string(),
            "7".to_string(),
        )
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn upsert_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let record = sample_record(&"a".repeat(40));
        store.upsert(record.clone()).await.unwrap();

        let reopened = TorrentStore::open(dir.path()).await.unwrap();
        let reloaded = reopened.get(&record.hash).await.unwrap();
        assert_eq!(reloaded, record);
    }

    #[tokio::test]
    async fn remove_drops_the_record_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let record = sample_record(&"b".repeat(40));
        store.upsert(record.clone()).await.unwrap();
        store.remove(&record.hash).await.unwrap();

        let reopened = TorrentStore::open(dir.path()).await.unwrap();
        assert!(reopened.get(&record.hash).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("state.json"), b"{not json").unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_fields_round_trip_for_forward_compatibility() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "torrents": {},
                "future_field": {"some": "data"}
            })
            .to_string(),
        )
        .unwrap();

        let store = TorrentStore::open(dir.path()).await.unwrap();
        let record = sample_record(&"c".repeat(40));
        store.upsert(record).await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["future_field"]["some"], "data");
    }

    #[tokio::test]
    async fn replace_all_swaps_the_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        store.upsert(sample_record(&"d".repeat(40))).await.unwrap();

        let mut replacement = sample_record(&"e".repeat(40));
        replacement.transition(TorrentState::Home(
            transferarr_endpoint::EndpointState::Seeding,
        ));
        store.replace_all(vec![replacement.clone()]).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0], replacement);
    }

    #[tokio::test]
    async fn update_progress_touches_only_the_progress_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let mut record = sample_record(&"f".repeat(40));
        record.transition(TorrentState::Copying);
        store.upsert(record.clone()).await.unwrap();

        let progress = crate::model::ProgressView {
            current_file_index: 1,
            total_files: 3,
            current_file_name: "b.mkv".to_string(),
            byte_progress: 1024,
            transfer_speed: 512.0,
        };
        store.update_progress(&record.hash, progress.clone()).await.unwrap();

        let updated = store.get(&record.hash).await.unwrap();
        assert_eq!(updated.progress_view, progress);
        assert_eq!(updated.state, TorrentState::Copying);
    }

    #[tokio::test]
    async fn report_job_outcome_completed_transitions_to_copied() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let mut record = sample_record(&"1".repeat(40));
        record.transition(TorrentState::Copying);
        store.upsert(record.clone()).await.unwrap();

        store
            .report_job_outcome(&record.hash, crate::model::JobOutcome::Completed)
            .await
            .unwrap();

        let updated = store.get(&record.hash).await.unwrap();
        assert_eq!(updated.state, TorrentState::Copied);
    }

    #[tokio::test]
    async fn report_job_outcome_failed_attaches_error_without_changing_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let mut record = sample_record(&"2".repeat(40));
        record.transition(TorrentState::Copying);
        store.upsert(record.clone()).await.unwrap();

        let error = crate::model::ErrorInfo {
            kind: crate::model::ErrorKind::CopyFailed,
            message: "transport reset".to_string(),
            when: chrono::Utc::now(),
        };
        store
            .report_job_outcome(&record.hash, crate::model::JobOutcome::Failed(error.clone()))
            .await
            .unwrap();

        let updated = store.get(&record.hash).await.unwrap();
        assert_eq!(updated.state, TorrentState::Copying);
        assert_eq!(updated.error, Some(error));
    }

    #[tokio::test]
    async fn mutate_applies_the_closure_and_returns_its_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let record = sample_record(&"3".repeat(40));
        store.upsert(record.clone()).await.unwrap();

        let previous_count = store
            .mutate(&record.hash, |record| {
                let previous = record.unclaimed_count;
                record.unclaimed_count += 1;
                previous
            })
            .await
            .unwrap();

        assert_eq!(previous_count, Some(0));
        assert_eq!(store.get(&record.hash).await.unwrap().unclaimed_count, 1);
    }

    #[tokio::test]
    async fn mutate_is_a_no_op_for_an_untracked_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = TorrentStore::open(dir.path()).await.unwrap();
        let missing = InfoHash::parse(&"4".repeat(40)).unwrap();

        let result = store.mutate(&missing, |record| record.unclaimed_count += 1).await.unwrap();

        assert!(result.is_none());
    }
}
