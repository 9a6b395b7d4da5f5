//! The step-by-step body of a single copy job: dedup-aware payload
//! copy, metainfo hand-off, and terminal-state reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use transferarr_endpoint::AddMetainfoOptions;
use transferarr_record::{ErrorInfo, ErrorKind, InfoHash, JobOutcome, ProgressView};
use transferarr_transport::{copy_tree, join, CopyProgress};

use crate::error::{JobError, JobResult};
use crate::{ConnectionContext, CopyJob};

/// Runs one copy job to completion, reporting its outcome on `job.hash`'s
/// record before returning.
///
/// # Errors
///
/// Returns the [`JobError`] that was also recorded on the torrent's
/// record, so callers only need it for logging and metrics.
pub(crate) async fn run(
    connection: Arc<ConnectionContext>,
    store: Arc<transferarr_record::TorrentStore>,
    history: Arc<dyn transferarr_events::HistorySink>,
    job: CopyJob,
) -> JobResult<()> {
    match run_inner(&connection, &store, &history, &job).await {
        Ok(()) => {
            store
                .report_job_outcome(&job.hash, JobOutcome::Completed)
                .await
                .ok();
            history
                .record(
                    transferarr_events::HistoryEvent::TransferCompleted {
                        hash: job.hash.to_string(),
                    },
                    Utc::now(),
                )
                .ok();
            Ok(())
        }
        Err(error) => {
            let kind = match &error {
                JobError::MetainfoMissing { .. } => ErrorKind::MetainfoMissing,
                JobError::CopyFailed { .. } | JobError::AddMetainfoFailed { .. } => {
                    ErrorKind::CopyFailed
                }
            };
            let kind_label = match kind {
                ErrorKind::MetainfoMissing => "metainfo_missing",
                ErrorKind::CopyFailed => "copy_failed",
                ErrorKind::Fatal => "fatal",
            };
            connection.metrics.inc_job_error(kind_label);
            let info = ErrorInfo {
                kind,
                message: error.to_string(),
                when: Utc::now(),
            };
            store
                .report_job_outcome(&job.hash, JobOutcome::Failed(info))
                .await
                .ok();
            history
                .record(
                    transferarr_events::HistoryEvent::TransferFailed {
                        hash: job.hash.to_string(),
                        reason: error.to_string(),
                    },
                    Utc::now(),
                )
                .ok();
            Err(error)
        }
    }
}

async fn run_inner(
    connection: &ConnectionContext,
    store: &Arc<transferarr_record::TorrentStore>,
    history: &Arc<dyn transferarr_events::HistorySink>,
    job: &CopyJob,
) -> JobResult<()> {
    history
        .record(
            transferarr_events::HistoryEvent::TransferStarted {
                hash: job.hash.to_string(),
                name: job.name.clone(),
                from: connection.home_name.clone(),
                to: connection.target_name.clone(),
                size: 0,
            },
            Utc::now(),
        )
        .ok();

    copy_payload(connection, store, history, job).await?;

    let metainfo_path = join(&connection.source_metainfo_dir, &format!("{}.torrent", job.hash));
    let metainfo = connection
        .source
        .read_file(&metainfo_path)
        .await
        .map_err(|source| JobError::MetainfoMissing {
            hash: job.hash.to_string(),
            source,
        })?;

    let tmp_name = format!("{}-{}.torrent", job.hash, Uuid::new_v4());
    let tmp_path = join(&connection.target_metainfo_tmp_dir, &tmp_name);
    if let Err(source) = connection.target.write_file(&tmp_path, &metainfo).await {
        warn!(hash = %job.hash, error = %source, "failed to stage metainfo file, continuing with direct add");
    }

    connection
        .target_endpoint
        .add_metainfo(
            &metainfo,
            AddMetainfoOptions {
                save_path: connection.target_payload_dir.clone(),
                paused: false,
            },
        )
        .await
        .map_err(|source| JobError::AddMetainfoFailed {
            hash: job.hash.to_string(),
            source,
        })?;

    Ok(())
}

async fn copy_payload(
    connection: &ConnectionContext,
    store: &Arc<transferarr_record::TorrentStore>,
    history: &Arc<dyn transferarr_events::HistorySink>,
    job: &CopyJob,
) -> JobResult<()> {
    let source_path = join(&connection.source_payload_dir, &job.top_level_entry);
    let dest_path = join(&connection.target_payload_dir, &job.top_level_entry);

    let attempt = copy_once(connection, &source_path, &dest_path, store, history, job).await;
    let source = match attempt {
        Ok(()) => return Ok(()),
        Err(source) if source.is_retryable() => source,
        Err(source) => {
            return Err(JobError::CopyFailed {
                hash: job.hash.to_string(),
                source,
            })
        }
    };

    warn!(hash = %job.hash, error = %source, "copy attempt failed, retrying once after reconnect");
    connection.source.ensure_connected().await.ok();
    connection.target.ensure_connected().await.ok();

    copy_once(connection, &source_path, &dest_path, store, history, job)
        .await
        .map_err(|source| JobError::CopyFailed {
            hash: job.hash.to_string(),
            source,
        })
}

async fn copy_once(
    connection: &ConnectionContext,
    source_path: &str,
    dest_path: &str,
    store: &Arc<transferarr_record::TorrentStore>,
    history: &Arc<dyn transferarr_events::HistorySink>,
    job: &CopyJob,
) -> transferarr_transport::TransportResult<()> {
    let mut tracker = ProgressPublisher::new(
        Arc::clone(store),
        Arc::clone(history),
        job.hash.clone(),
        connection.progress_interval,
    );

    let outcome = copy_tree(
        connection.source.as_ref(),
        source_path,
        connection.target.as_ref(),
        dest_path,
        Box::new(move |progress| tracker.on_progress(progress)),
    )
    .await?;

    connection
        .metrics
        .add_copy_bytes(&connection.name, outcome.bytes_copied);
    Ok(())
}

/// Accumulates whole-job byte progress across `copy_tree`'s per-file
/// callbacks, estimates throughput with [`crate::speed::SpeedTracker`],
/// and throttles the resulting writes to the torrent record and history
/// sink to roughly once every `progress_interval`.
///
/// Writes are fire-and-forget `tokio::spawn` tasks: a slow or failing
/// progress write must never stall the copy itself.
struct ProgressPublisher {
    store: Arc<transferarr_record::TorrentStore>,
    history: Arc<dyn transferarr_events::HistorySink>,
    hash: InfoHash,
    speed: crate::speed::SpeedTracker,
    completed_bytes: u64,
    current_file_index: usize,
    current_file_total: u64,
    last_write: Option<Instant>,
    progress_interval: Duration,
}

impl ProgressPublisher {
    fn new(
        store: Arc<transferarr_record::TorrentStore>,
        history: Arc<dyn transferarr_events::HistorySink>,
        hash: InfoHash,
        progress_interval: Duration,
    ) -> Self {
        Self {
            store,
            history,
            hash,
            speed: crate::speed::SpeedTracker::new(),
            completed_bytes: 0,
            current_file_index: 0,
            current_file_total: 0,
            last_write: None,
            progress_interval,
        }
    }

    fn on_progress(&mut self, progress: CopyProgress<'_>) {
        if progress.file_index != self.current_file_index {
            self.completed_bytes += self.current_file_total;
            self.current_file_index = progress.file_index;
        }
        self.current_file_total = progress.bytes_total;

        let total_done = self.completed_bytes + progress.bytes_done;
        let now = Instant::now();
        let speed = self.speed.sample(now, total_done);

        let is_final_file = progress.file_index + 1 == progress.total_files
            && progress.bytes_done == progress.bytes_total;
        let due = self
            .last_write
            .is_none_or(|last| now.duration_since(last) >= self.progress_interval);

        if !(due || is_final_file) {
            return;
        }
        self.last_write = Some(now);

        let running_total = self.completed_bytes + progress.bytes_total;
        let view = ProgressView {
            current_file_index: progress.file_index as u64,
            total_files: progress.total_files as u64,
            current_file_name: progress.file_name.to_string(),
            byte_progress: total_done,
            transfer_speed: speed,
        };

        let store = Arc::clone(&self.store);
        let history = Arc::clone(&self.history);
        let hash = self.hash.clone();
        tokio::spawn(async move {
            if let Err(err) = store.update_progress(&hash, view.clone()).await {
                debug!(%hash, error = %err, "failed to persist copy progress");
            }
            history
                .record(
                    transferarr_events::HistoryEvent::TransferProgress {
                        hash: hash.to_string(),
                        bytes_done: view.byte_progress,
                        bytes_total: running_total,
                        speed: view.transfer_speed,
                    },
                    Utc::now(),
                )
                .ok();
        });
    }
}
