//! The torrent record and its state-transition vocabulary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use transferarr_endpoint::EndpointState;

/// A validated, lower-cased 40-character hex info hash.
///
/// Torrent clients and media managers disagree on case; this type is the
/// single place that normalises it so every comparison in the orchestrator
/// is by construction case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash(String);

/// Error returned when a string is not a valid 40-character hex info hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInfoHash(pub String);

impl fmt::Display for InvalidInfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a 40-character hex info hash", self.0)
    }
}

impl std::error::Error for InvalidInfoHash {}

impl InfoHash {
    /// Validates and lower-cases `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInfoHash`] if `raw` is not exactly 40 hex digits.
    pub fn parse(raw: &str) -> Result<Self, InvalidInfoHash> {
        if raw.len() == 40 && raw.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(InvalidInfoHash(raw.to_string()))
        }
    }

    /// Borrows the lower-cased hash string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(DeError::custom)
    }
}

/// A torrent's position in the migration lifecycle.
///
/// Serialises as the flat uppercase labels used throughout the
/// specification (`MANAGER_QUEUED`, `HOME_SEEDING`, `TARGET_SEEDING`, ...)
/// rather than as a tagged struct, matching the vocabulary operators
/// actually see in the persisted state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    /// Surfaced by a media manager but not yet located on any endpoint.
    ManagerQueued,
    /// Located on `home_client`, mirroring the client's native state.
    Home(EndpointState),
    /// A copy job is in flight for this torrent.
    Copying,
    /// The copy and metainfo hand-off both completed; waiting for the
    /// target endpoint to report the torrent.
    Copied,
    /// Located on `target_client`, mirroring the client's native state.
    Target(EndpointState),
    /// Not located on any configured endpoint this tick.
    Unclaimed,
    /// Terminal failure; never auto-resolves.
    Error,
}

impl TorrentState {
    const MANAGER_QUEUED: &'static str = "MANAGER_QUEUED";
    const COPYING: &'static str = "COPYING";
    const COPIED: &'static str = "COPIED";
    const UNCLAIMED: &'static str = "UNCLAIMED";
    const ERROR: &'static str = "ERROR";

    fn label(self) -> String {
        match self {
            Self::ManagerQueued => Self::MANAGER_QUEUED.to_string(),
            Self::Home(state) => format!("HOME_{}", state.label()),
            Self::Copying => Self::COPYING.to_string(),
            Self::Copied => Self::COPIED.to_string(),
            Self::Target(state) => format!("TARGET_{}", state.label()),
            Self::Unclaimed => Self::UNCLAIMED.to_string(),
            Self::Error => Self::ERROR.to_string(),
        }
    }

    /// Parses a label produced by [`Self::label`]. Unknown labels return
    /// `None` so the caller can decide how to degrade (the state store
    /// logs and falls back to [`Self::Error`]).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            Self::MANAGER_QUEUED => Some(Self::ManagerQueued),
            Self::COPYING => Some(Self::Copying),
            Self::COPIED => Some(Self::Copied),
            Self::UNCLAIMED => Some(Self::Unclaimed),
            Self::ERROR => Some(Self::Error),
            _ => label
                .strip_prefix("HOME_")
                .and_then(EndpointState::from_label)
                .map(Self::Home)
                .or_else(|| {
                    label
                        .strip_prefix("TARGET_")
                        .and_then(EndpointState::from_label)
                        .map(Self::Target)
                }),
        }
    }

    /// True once the torrent has a resolved, writable target.
    #[must_use]
    pub const fn implies_target_resolved(self) -> bool {
        matches!(self, Self::Copied | Self::Target(_))
    }
}

impl Serialize for TorrentState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for TorrentState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_label(&label).ok_or_else(|| {
            DeError::custom(format!("'{label}' is not a recognised torrent state"))
        })
    }
}

/// Classification of a fatal-to-record failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The copy job failed `K_COPY_RETRY` times.
    CopyFailed,
    /// The source metainfo file for this hash could not be found.
    MetainfoMissing,
    /// Any other condition the orchestrator treats as non-retryable.
    Fatal,
}

/// A structured, fatal-to-record failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable detail for operators.
    pub message: String,
    /// When the failure was recorded.
    pub when: DateTime<Utc>,
}

/// Last-observed copy progress. Purely for reporting; never authoritative
/// for state transitions.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProgressView {
    /// Index of the file currently being copied, 0-based.
    #[serde(default)]
    pub current_file_index: u64,
    /// Total number of top-level files being copied for this job.
    #[serde(default)]
    pub total_files: u64,
    /// Name of the file currently being copied.
    #[serde(default)]
    pub current_file_name: String,
    /// Bytes copied so far across the whole job.
    #[serde(default)]
    pub byte_progress: u64,
    /// Instantaneous speed over the trailing ~2s window, bytes/second.
    #[serde(default)]
    pub transfer_speed: f64,
}

/// A tracked torrent and its migration state.
///
/// Identity is [`InfoHash`]; mutated exclusively by the orchestrator driver
/// (executor workers may only write `progress_view` and their own job's
/// terminal state).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentRecord {
    /// Stable identity.
    pub hash: InfoHash,
    /// Display name, refreshed from the authoritative source when first
    /// observed.
    pub name: String,
    /// Current lifecycle state.
    pub state: TorrentState,
    /// Endpoint this torrent currently lives on, if located.
    #[serde(default)]
    pub home_client: Option<String>,
    /// Endpoint this torrent should migrate to, once resolved.
    #[serde(default)]
    pub target_client: Option<String>,
    /// Which media-manager adapter kind owns this torrent.
    pub manager_kind: String,
    /// Opaque identifier returned by the manager, used to confirm ingest
    /// and dequeue on retirement.
    pub manager_queue_id: String,
    /// Last-observed copy progress.
    #[serde(default)]
    pub progress_view: ProgressView,
    /// Consecutive ticks during which this record could not be located on
    /// any endpoint. Capped at `K_UNCLAIMED`.
    #[serde(default)]
    pub unclaimed_count: u32,
    /// Consecutive copy-job failures for the lifetime of this record.
    /// Capped at `K_COPY_RETRY`.
    #[serde(default)]
    pub copy_retry_count: u32,
    /// Current fatal-to-record failure, if any.
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    /// The state this record held immediately before becoming `Unclaimed`,
    /// restored verbatim if it is located again.
    #[serde(default)]
    pub state_before_unclaimed: Option<TorrentState>,
    /// Monotonically increasing counter bumped on every durable write.
    /// Lets external readers detect whether their cached view is stale.
    #[serde(default)]
    pub revision: u64,
    /// Fields from a newer process version we don't understand yet.
    /// Round-tripped verbatim so upgrading and downgrading never loses data.
    #[serde(flatten)]
    pub unknown: serde_json::Map<String, serde_json::Value>,
}

/// Terminal outcome of one executor job, reported back through
/// [`crate::store::TorrentStore::report_job_outcome`].
///
/// This is the one channel by which a worker is allowed to influence
/// `state`: a success sets it directly to [`TorrentState::Copied`];
/// a failure only attaches `error` and leaves `state` at
/// [`TorrentState::Copying`] so the driver — which alone knows the
/// record's retry budget — decides on the next tick whether to retry or
/// give up into [`TorrentState::Error`].
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The copy and metainfo hand-off both completed.
    Completed,
    /// The job failed; `error` describes why.
    Failed(ErrorInfo),
}

impl TorrentRecord {
    /// Creates a freshly manager-queued record.
    #[must_use]
    pub fn new_manager_queued(
        hash: InfoHash,
        name: String,
        manager_kind: String,
        manager_queue_id: String,
    ) -> Self {
        Self {
            hash,
            name,
            state: TorrentState::ManagerQueued,
            home_client: None,
            target_client: None,
            manager_kind,
            manager_queue_id,
            progress_view: ProgressView::default(),
            unclaimed_count: 0,
            copy_retry_count: 0,
            error: None,
            state_before_unclaimed: None,
            revision: 0,
            unknown: serde_json::Map::new(),
        }
    }

    /// Applies `new_state`, bumping `revision`. Callers are responsible for
    /// checking the transition is legal before calling this (the legality
    /// table lives in `transferarr-orchestrator`, which owns sequencing).
    pub fn transition(&mut self, new_state: TorrentState) {
        self.state = new_state;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_rejects_wrong_length_and_non_hex() {
        assert!(InfoHash::parse(&"a".repeat(39)).is_err());
        assert!(InfoHash::parse(&"z".repeat(40)).is_err());
        assert!(InfoHash::parse(&"A".repeat(40)).is_ok());
    }

    #[test]
    fn info_hash_lower_cases() {
        let hash = InfoHash::parse(&"AB".repeat(20)).unwrap();
        assert_eq!(hash.as_str(), "ab".repeat(20));
    }

    #[test]
    fn torrent_state_round_trips_every_label() {
        let states = [
            TorrentState::ManagerQueued,
            TorrentState::Home(EndpointState::Seeding),
            TorrentState::Copying,
            TorrentState::Copied,
            TorrentState::Target(EndpointState::Checking),
            TorrentState::Unclaimed,
            TorrentState::Error,
        ];
        for state in states {
            let json = serde_json::to_string(&state).unwrap();
            let parsed: TorrentState = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn torrent_state_rejects_unknown_label() {
        let result: Result<TorrentState, _> = serde_json::from_str("\"NOT_A_STATE\"");
        assert!(result.is_err());
    }

    #[test]
    fn target_resolved_only_for_copied_and_target_states() {
        assert!(TorrentState::Copied.implies_target_resolved());
        assert!(TorrentState::Target(EndpointState::Seeding).implies_target_resolved());
        assert!(!TorrentState::Copying.implies_target_resolved());
        assert!(!TorrentState::Home(EndpointState::Seeding).implies_target_resolved());
    }

    #[test]
    fn transition_bumps_revision() {
        let mut record = TorrentRecord::new_manager_queued(
            InfoHash::parse(&"a".repeat(40)).unwrap(),
            "name".to_string(),
            "movies".to_string(),
            "42".to_string(),
        );
        assert_eq!(record.revision, 0);
        record.transition(TorrentState::Home(EndpointState::Seeding));
        assert_eq!(record.revision, 1);
        assert_eq!(record.state, TorrentState::Home(EndpointState::Seeding));
    }

    #[test]
    fn torrent_record_preserves_unknown_fields_across_a_round_trip() {
        let mut value = serde_json::to_value(TorrentRecord::new_manager_queued(
            InfoHash::parse(&"a".repeat(40)).unwrap(),
            "name".to_string(),
            "movies".to_string(),
            "42".to_string(),
        ))
        .unwrap();
        value["future_field"] = serde_json::json!("from a newer version");

        let record: TorrentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(
            record.unknown.get("future_field"),
            Some(&serde_json::json!("from a newer version"))
        );

        let saved = serde_json::to_value(&record).unwrap();
        assert_eq!(saved["future_field"], "from a newer version");
    }
}
