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

//! Bounded per-connection worker pool that runs copy jobs.
//!
//! An [`Executor`] owns exactly one [`ConnectionContext`] and runs up to
//! `worker_count` jobs concurrently against it. The driver in
//! `transferarr-orchestrator` decides *which* torrents become jobs and
//! reacts to their terminal state; everything in here is mechanical:
//! copy the payload, hand the metainfo to the target endpoint, and report
//! back through [`transferarr_record::TorrentStore::report_job_outcome`].

mod job;
pub mod error;
pub mod speed;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use transferarr_endpoint::EndpointClient;
use transferarr_events::HistorySink;
use transferarr_record::{InfoHash, TorrentStore};
use transferarr_telemetry::Metrics;
use transferarr_transport::Transport;

pub use error::{JobError, JobResult, QueueFullError};
pub use speed::SpeedTracker;

/// Everything a job needs to move one torrent's payload and metainfo from
/// one endpoint to another.
///
/// Deliberately independent of `transferarr-config`'s types: the wiring
/// layer (the app binary, or tests) is responsible for resolving a parsed
/// connection definition into the trait objects and paths here.
pub struct ConnectionContext {
    /// The connection's configured name, used in logs.
    pub name: String,
    /// Name of the home endpoint, carried into history events as `from`.
    pub home_name: String,
    /// Name of the target endpoint, carried into history events as `to`.
    pub target_name: String,
    /// Filesystem access to the home endpoint's directories.
    pub source: Arc<dyn Transport>,
    /// Filesystem access to the target endpoint's directories.
    pub target: Arc<dyn Transport>,
    /// The target torrent client, used for the `add_metainfo` hand-off.
    pub target_endpoint: Arc<dyn EndpointClient>,
    /// Directory on `source` holding `.torrent` metainfo files, one named
    /// `<hash>.torrent` per tracked torrent.
    pub source_metainfo_dir: String,
    /// Directory on `source` holding torrent payloads.
    pub source_payload_dir: String,
    /// Scratch directory on `target` that staged metainfo files are
    /// written to ahead of the `add_metainfo` call.
    pub target_metainfo_tmp_dir: String,
    /// Directory on `target` that payloads are copied into, and the
    /// `save_path` handed to the target endpoint.
    pub target_payload_dir: String,
    /// Minimum gap between persisted progress checkpoints for a job
    /// running against this connection.
    pub progress_interval: Duration,
    /// Metrics registry updated with this connection's copy throughput and
    /// job outcomes.
    pub metrics: Metrics,
}

/// One unit of work: copy `hash`'s payload and hand its metainfo to the
/// target endpoint.
#[derive(Debug, Clone)]
pub struct CopyJob {
    /// Info hash of the torrent being migrated.
    pub hash: InfoHash,
    /// Display name, carried through for history events and logs.
    pub name: String,
    /// The torrent's single top-level payload entry (file or directory),
    /// already resolved and deduplicated by the driver via
    /// [`transferarr_transport::first_component`].
    pub top_level_entry: String,
}

/// A bounded pool of worker tasks draining jobs for one connection.
///
/// Backpressure is explicit: [`Self::try_enqueue`] returns
/// [`QueueFullError`] rather than blocking, so the driver's tick loop
/// never stalls behind a saturated connection.
pub struct Executor {
    connection_name: String,
    sender: mpsc::Sender<CopyJob>,
    queue_capacity: usize,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl Executor {
    /// Spawns `worker_count` tasks, each pulling jobs from a shared
    /// bounded queue of `queue_capacity` and running them against
    /// `connection`.
    #[must_use]
    pub fn spawn(
        connection: Arc<ConnectionContext>,
        store: Arc<TorrentStore>,
        history: Arc<dyn HistorySink>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let connection_name = connection.name.clone();

        let workers = (0..worker_count)
            .map(|worker_index| {
                let receiver = Arc::clone(&receiver);
                let connection = Arc::clone(&connection);
                let store = Arc::clone(&store);
                let history = Arc::clone(&history);
                let connection_name = connection_name.clone();

                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        let Some(job) = job else { break };
                        let hash = job.hash.clone();
                        info!(connection = %connection_name, worker_index, %hash, "starting copy job");
                        if let Err(error) = job::run(
                            Arc::clone(&connection),
                            Arc::clone(&store),
                            Arc::clone(&history),
                            job,
                        )
                        .await
                        {
                            warn!(
                                connection = %connection_name,
                                worker_index,
                                %hash,
                                error = %error,
                                "copy job failed"
                            );
                        }
                    }
                })
            })
            .collect();

        Self {
            connection_name,
            sender,
            queue_capacity,
            workers,
        }
    }

    /// The connection this pool serves.
    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Jobs currently queued or in flight, for the queue-depth gauge.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue_capacity.saturating_sub(self.sender.capacity())
    }

    /// Attempts to enqueue `job` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFullError`] if every worker is busy and the queue is
    /// already at capacity. Callers should leave the record alone and try
    /// again on the next tick.
    pub fn try_enqueue(&self, job: CopyJob) -> Result<(), QueueFullError> {
        self.sender.try_send(job).map_err(|_| QueueFullError)
    }

    /// Stops accepting new jobs and waits up to `deadline` for in-flight
    /// jobs to finish before returning.
    pub async fn shutdown(self, deadline: Duration) {
        drop(self.sender);
        let join_all = async {
            for worker in self.workers {
                worker.await.ok();
            }
        };
        if tokio::time::timeout(deadline, join_all).await.is_err() {
            warn!(
                connection = %self.connection_name,
                ?deadline,
                "executor shutdown deadline elapsed with workers still in flight"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;
    use tokio::time::{sleep, Duration};

    use transferarr_endpoint::{AddMetainfoOptions, EndpointResult, TorrentSummary};
    use transferarr_events::NullHistorySink;
    use transferarr_record::TorrentRecord;
    use transferarr_transport::LocalTransport;

    use super::*;

    struct RecordingEndpoint {
        added: AsyncMutex<Vec<(String, AddMetainfoOptions)>>,
    }

    #[async_trait]
    impl EndpointClient for RecordingEndpoint {
        fn name(&self) -> &str {
            "target"
        }

        async fn ensure_connected(&self) -> EndpointResult<()> {
            Ok(())
        }

        async fn list(&self) -> EndpointResult<HashMap<String, TorrentSummary>> {
            Ok(HashMap::new())
        }

        async fn add_metainfo(
            &self,
            metainfo: &[u8],
            options: AddMetainfoOptions,
        ) -> EndpointResult<()> {
            self.added
                .lock()
                .await
                .push((String::from_utf8_lossy(metainfo).into_owned(), options));
            Ok(())
        }

        async fn remove(&self, _hash: &str, _delete_data: bool) -> EndpointResult<()> {
            Ok(())
        }
    }

    fn sample_hash() -> InfoHash {
        InfoHash::parse(&"a".repeat(40)).unwrap()
    }

    async fn build_connection() -> (
        Arc<ConnectionContext>,
        Arc<RecordingEndpoint>,
        tempfile::TempDir,
        tempfile::TempDir,
    ) {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let source = LocalTransport::new(source_dir.path());
        let target = LocalTransport::new(target_dir.path());

        source
            .write_file("payload/movie.mkv", b"payload-bytes")
            .await
            .unwrap();
        source
            .write_file(&format!("metainfo/{}.torrent", sample_hash()), b"fake-metainfo")
            .await
            .unwrap();

        let endpoint = Arc::new(RecordingEndpoint {
            added: AsyncMutex::new(Vec::new()),
        });

        let connection = ConnectionContext {
            name: "home-to-target".to_string(),
            home_name: "home".to_string(),
            target_name: "target".to_string(),
            source: Arc::new(source),
            target: Arc::new(target),
            target_endpoint: Arc::clone(&endpoint) as Arc<dyn EndpointClient>,
            source_metainfo_dir: "metainfo".to_string(),
            source_payload_dir: "payload".to_string(),
            target_metainfo_tmp_dir: "tmp".to_string(),
            target_payload_dir: "payload".to_string(),
            progress_interval: Duration::from_secs(2),
            metrics: transferarr_telemetry::Metrics::new().unwrap(),
        };

        (Arc::new(connection), endpoint, source_dir, target_dir)
    }

    #[tokio::test]
    async fn a_successful_job_copies_the_payload_and_marks_the_record_copied() {
        let (connection, endpoint, _source_dir, target_dir) = build_connection().await;
        let state_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TorrentStore::open(state_dir.path()).await.unwrap());
        let history: Arc<dyn HistorySink> = Arc::new(NullHistorySink);

        let hash = sample_hash();
        let mut record = TorrentRecord::new_manager_queued(
            hash.clone(),
            "Some.Movie.2020".to_string(),
            "movies".to_string(),
            "42".to_string(),
        );
        record.transition(transferarr_record::TorrentState::Copying);
        store.upsert(record).await.unwrap();

        let executor = Executor::spawn(
            Arc::clone(&connection),
            Arc::clone(&store),
            history,
            2,
            8,
        );

        executor
            .try_enqueue(CopyJob {
                hash: hash.clone(),
                name: "Some.Movie.2020".to_string(),
                top_level_entry: "movie.mkv".to_string(),
            })
            .unwrap();

        for _ in 0..50 {
            let record = store.get(&hash).await.unwrap();
            if record.state == transferarr_record::TorrentState::Copied {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        let record = store.get(&hash).await.unwrap();
        assert_eq!(record.state, transferarr_record::TorrentState::Copied);
        assert_eq!(
            std::fs::read(target_dir.path().join("payload/movie.mkv")).unwrap(),
            b"payload-bytes"
        );

        let added = endpoint.added.lock().await;
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].0, "fake-metainfo");
        assert_eq!(added[0].1.save_path, "payload");
        drop(added);

        executor.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn a_missing_metainfo_file_leaves_the_record_failed_but_copying() {
        // A source directory with a payload but no metainfo file at all,
        // so the job fails at the metainfo read step.
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let source = LocalTransport::new(source_dir.path());
        let target = LocalTransport::new(target_dir.path());
        source
            .write_file("payload/movie.mkv", b"payload-bytes")
            .await
            .unwrap();

        let connection = Arc::new(ConnectionContext {
            name: "home-to-target".to_string(),
            home_name: "home".to_string(),
            target_name: "target".to_string(),
            source: Arc::new(source),
            target: Arc::new(target),
            target_endpoint: Arc::new(RecordingEndpoint {
                added: AsyncMutex::new(Vec::new()),
            }),
            source_metainfo_dir: "metainfo".to_string(),
            source_payload_dir: "payload".to_string(),
            target_metainfo_tmp_dir: "tmp".to_string(),
            target_payload_dir: "payload".to_string(),
            progress_interval: Duration::from_secs(2),
            metrics: transferarr_telemetry::Metrics::new().unwrap(),
        });

        let state_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TorrentStore::open(state_dir.path()).await.unwrap());
        let history: Arc<dyn HistorySink> = Arc::new(NullHistorySink);

        let hash = sample_hash();
        let mut record = TorrentRecord::new_manager_queued(
            hash.clone(),
            "Some.Movie.2020".to_string(),
            "movies".to_string(),
            "42".to_string(),
        );
        record.transition(transferarr_record::TorrentState::Copying);
        store.upsert(record).await.unwrap();

        let executor = Executor::spawn(connection, Arc::clone(&store), history, 1, 4);
        executor
            .try_enqueue(CopyJob {
                hash: hash.clone(),
                name: "Some.Movie.2020".to_string(),
                top_level_entry: "movie.mkv".to_string(),
            })
            .unwrap();

        for _ in 0..50 {
            let record = store.get(&hash).await.unwrap();
            if record.error.is_some() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        let record = store.get(&hash).await.unwrap();
        assert_eq!(
            record.state,
            transferarr_record::TorrentState::Copying,
            "a failed job must not move the record itself; that's the driver's job"
        );
        assert_eq!(
            record.error.unwrap().kind,
            transferarr_record::ErrorKind::MetainfoMissing
        );

        executor.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn try_enqueue_reports_queue_full_once_capacity_is_exhausted() {
        let (connection, _endpoint, _source_dir, _target_dir) = build_connection().await;
        let state_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TorrentStore::open(state_dir.path()).await.unwrap());
        let history: Arc<dyn HistorySink> = Arc::new(NullHistorySink);

        // Zero workers: nothing ever drains the queue, so the second
        // enqueue onto a capacity-1 channel must fail immediately.
        let executor = Executor::spawn(connection, store, history, 0, 1);

        let make_job = |n: u8| CopyJob {
            hash: InfoHash::parse(&n.to_string().repeat(40)).unwrap(),
            name: "x".to_string(),
            top_level_entry: "x".to_string(),
        };

        executor.try_enqueue(make_job(1)).unwrap();
        let result = executor.try_enqueue(make_job(2));
        assert!(result.is_err());
    }
}
