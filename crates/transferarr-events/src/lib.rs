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

//! Append-only transfer history recording.
//!
//! The history sink is an external collaborator's input: Transferarr only
//! ever appends to it. Querying, reporting, and retention are owned by
//! whatever consumes the resulting log, not by this crate.

pub mod error;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{HistoryError, HistoryResult};

/// One reportable transition in a torrent's lifecycle.
///
/// Exactly the four shapes the driver emits; sinks are not expected to
/// understand anything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// A copy job for `hash` began moving `size` bytes from `from` to `to`.
    TransferStarted {
        /// Lower-case 40-character info hash.
        hash: String,
        /// Torrent name, for human-readable logs.
        name: String,
        /// Name of the source connection endpoint.
        from: String,
        /// Name of the destination connection endpoint.
        to: String,
        /// Total payload size in bytes.
        size: u64,
    },
    /// Progress checkpoint emitted at most once per file, or throttled to
    /// roughly every two seconds while a file is in flight.
    TransferProgress {
        /// Lower-case 40-character info hash.
        hash: String,
        /// Bytes copied so far across the whole torrent.
        bytes_done: u64,
        /// Total payload size in bytes.
        bytes_total: u64,
        /// Instantaneous transfer speed in bytes/second.
        speed: f64,
    },
    /// The copy and metainfo hand-off to the target endpoint both succeeded.
    TransferCompleted {
        /// Lower-case 40-character info hash.
        hash: String,
    },
    /// The copy failed and the torrent moved to `ERROR`.
    TransferFailed {
        /// Lower-case 40-character info hash.
        hash: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl HistoryEvent {
    /// The torrent hash every variant carries, for log correlation.
    #[must_use]
    pub fn hash(&self) -> &str {
        match self {
            Self::TransferStarted { hash, .. }
            | Self::TransferProgress { hash, .. }
            | Self::TransferCompleted { hash }
            | Self::TransferFailed { hash, .. } => hash,
        }
    }

    /// Short, stable discriminator used in log fields and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransferStarted { .. } => "transfer_started",
            Self::TransferProgress { .. } => "transfer_progress",
            Self::TransferCompleted { .. } => "transfer_completed",
            Self::TransferFailed { .. } => "transfer_failed",
        }
    }
}

/// An event stamped with the wall-clock time it was recorded, the unit
/// actually persisted by [`JsonlHistorySink`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// When the sink accepted the event.
    pub recorded_at: DateTime<Utc>,
    /// The event itself.
    #[serde(flatten)]
    pub event: HistoryEvent,
}

/// Append-only history recorder.
///
/// Best-effort by contract: a sink failure is logged by the caller and must
/// never propagate into the orchestrator's tick loop or fail a transfer.
pub trait HistorySink: Send + Sync {
    /// Append one event. `recorded_at` is supplied by the caller so tests
    /// can control it rather than the sink reaching for the clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be serialised or persisted;
    /// callers are expected to log and discard it.
    fn record(&self, event: HistoryEvent, recorded_at: DateTime<Utc>) -> HistoryResult<()>;
}

/// Discards everything. Used in tests and wherever no external collaborator
/// is configured to consume the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHistorySink;

impl HistorySink for NullHistorySink {
    fn record(&self, _event: HistoryEvent, _recorded_at: DateTime<Utc>) -> HistoryResult<()> {
        Ok(())
    }
}

/// Newline-delimited JSON file, opened once and appended to for the life of
/// the process.
pub struct JsonlHistorySink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlHistorySink {
    /// Opens (creating if necessary) the history file at `path` in append
    /// mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| HistoryError::Append {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl HistorySink for JsonlHistorySink {
    fn record(&self, event: HistoryEvent, recorded_at: DateTime<Utc>) -> HistoryResult<()> {
        let record = HistoryRecord { recorded_at, event };
        let mut line =
            serde_json::to_vec(&record).map_err(|source| HistoryError::Serialize { source })?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        file.write_all(&line)
            .map_err(|source| HistoryError::Append {
                path: self.path.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> HistoryEvent {
        HistoryEvent::TransferStarted {
            hash: "a".repeat(40),
            name: "Some.Movie.2020".to_string(),
            from: "home".to_string(),
            to: "target".to_string(),
            size: 123,
        }
    }

    #[test]
    fn null_sink_always_succeeds() {
        let sink = NullHistorySink;
        assert!(sink.record(sample_event(), Utc::now()).is_ok());
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.jsonl");
        let sink = JsonlHistorySink::open(&path).expect("open sink");

        sink.record(sample_event(), Utc::now()).expect("record 1");
        sink.record(
            HistoryEvent::TransferCompleted {
                hash: "a".repeat(40),
            },
            Utc::now(),
        )
        .expect("record 2");

        let contents = std::fs::read_to_string(&path).expect("read history file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: HistoryRecord = serde_json::from_str(lines[0]).expect("parse line 1");
        assert_eq!(first.event.kind(), "transfer_started");
        let second: HistoryRecord = serde_json::from_str(lines[1]).expect("parse line 2");
        assert_eq!(second.event.kind(), "transfer_completed");
    }

    #[test]
    fn event_kind_and_hash_are_stable() {
        let event = HistoryEvent::TransferFailed {
            hash: "b".repeat(40),
            reason: "copy failed".to_string(),
        };
        assert_eq!(event.kind(), "transfer_failed");
        assert_eq!(event.hash(), "b".repeat(40));
    }
}
