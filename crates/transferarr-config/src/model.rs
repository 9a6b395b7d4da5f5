//! Deserialised shape of the process configuration file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use transferarr_transport::TransportDescriptor;

use crate::defaults;

/// `movies` media-manager kind (Radarr-shaped queue API).
pub const KIND_MOVIES: &str = "movies";
/// `series` media-manager kind (Sonarr-shaped queue API).
pub const KIND_SERIES: &str = "series";

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Media-manager instances to poll.
    pub media_managers: Vec<MediaManagerConfig>,
    /// Named torrent-client endpoints, keyed by the name connections refer
    /// to them by.
    pub download_clients: HashMap<String, DownloadClientConfig>,
    /// Named copy routes between two registered download clients.
    pub connections: HashMap<String, ConnectionConfig>,
    /// Driver tunables; entirely optional, defaulted field-by-field.
    #[serde(default)]
    pub tunables: TunablesConfig,
}

/// One configured media-manager instance.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaManagerConfig {
    /// Adapter kind: `movies` or `series`.
    pub kind: String,
    /// Hostname or IP address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// API key issued by the manager instance.
    pub api_key: String,
}

/// One configured torrent-client endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadClientConfig {
    /// Client kind: `qbittorrent` or `transmission`.
    pub kind: String,
    /// Scheme used to reach the client's API: `http` or `https`.
    pub connection_kind: String,
    /// Hostname or IP address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Username, where the client's API requires authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password, where the client's API requires authentication.
    #[serde(default)]
    pub password: Option<String>,
}

impl DownloadClientConfig {
    /// Builds the base URL (`{connection_kind}://{host}:{port}`) endpoint
    /// clients connect to.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.connection_kind, self.host, self.port)
    }
}

/// One configured copy route between two download clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Name of the home-side download client.
    pub from: String,
    /// Name of the target-side download client.
    pub to: String,
    /// How to reach each side's filesystem.
    pub transfer_config: TransferConfig,
    /// Directory on the source transport holding `.torrent` metainfo files.
    pub source_metainfo_dir: PathBuf,
    /// Directory on the source transport holding completed payloads.
    pub source_payload_dir: PathBuf,
    /// Directory on the target transport metainfo is staged into before the
    /// target endpoint picks it up.
    pub target_metainfo_tmp_dir: PathBuf,
    /// Directory on the target transport payloads are copied into.
    pub target_payload_dir: PathBuf,
}

/// Transport descriptors for both sides of a connection.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// How to reach the `from` endpoint's filesystem.
    pub from: TransportDescriptor,
    /// How to reach the `to` endpoint's filesystem.
    pub to: TransportDescriptor,
}

/// Driver tunables, individually defaulted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunablesConfig {
    /// Reconciliation tick period, in milliseconds.
    pub tick_ms: u64,
    /// Bounded worker-pool size per connection.
    pub worker_count: usize,
    /// Consecutive-unclaimed-ticks budget before a record is dropped.
    pub k_unclaimed: u32,
    /// Copy-job retry budget before a job is recorded as failed.
    pub k_copy_retry: u32,
    /// Post-ingest ticks the driver waits before retiring the home-side
    /// copy.
    pub k_post_ingest_ticks: u32,
    /// Per-call timeout applied to endpoint, manager and transport calls,
    /// in milliseconds.
    pub call_timeout_ms: u64,
    /// Minimum interval between progress-view writes, in milliseconds.
    pub progress_throttle_ms: u64,
}

impl Default for TunablesConfig {
    fn default() -> Self {
        Self {
            tick_ms: defaults::T_TICK_MS,
            worker_count: defaults::W,
            k_unclaimed: defaults::K_UNCLAIMED,
            k_copy_retry: defaults::K_COPY_RETRY,
            k_post_ingest_ticks: defaults::K_POST_INGEST_TICKS,
            call_timeout_ms: defaults::CALL_TIMEOUT_MS,
            progress_throttle_ms: defaults::PROGRESS_THROTTLE_MS,
        }
    }
}

impl TunablesConfig {
    /// Reconciliation tick period as a [`Duration`].
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Progress-write throttle as a [`Duration`].
    #[must_use]
    pub const fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }
}
