//! Prometheus metrics registry for the reconciliation driver and executors.

use std::sync::Arc;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the driver and executors.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    tracked_torrents: IntGaugeVec,
    queue_depth: IntGaugeVec,
    copy_bytes_total: IntCounterVec,
    tick_duration_ms: Histogram,
    copy_retries_total: IntCounter,
    unclaimed_drops_total: IntCounter,
    job_errors_total: IntCounterVec,
}

/// Point-in-time snapshot of the gauges, useful for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Number of torrents currently tracked in the state store.
    pub tracked_torrents: i64,
    /// Sum of pending copy-queue depth across all connections.
    pub total_queue_depth: i64,
}

impl Metrics {
    /// Constructs a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::MetricsRegister`] if a collector cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tracked_torrents = IntGaugeVec::new(
            Opts::new(
                "transferarr_tracked_torrents",
                "Torrents currently tracked in the state store.",
            ),
            &["connection"],
        )
        .map_err(|source| TelemetryError::metrics_register("tracked_torrents", source))?;
        let queue_depth = IntGaugeVec::new(
            Opts::new(
                "transferarr_queue_depth",
                "Pending copy jobs queued per connection.",
            ),
            &["connection"],
        )
        .map_err(|source| TelemetryError::metrics_register("queue_depth", source))?;
        let copy_bytes_total = IntCounterVec::new(
            Opts::new(
                "transferarr_copy_bytes_total",
                "Bytes copied from source to target, by connection.",
            ),
            &["connection"],
        )
        .map_err(|source| TelemetryError::metrics_register("copy_bytes_total", source))?;
        let tick_duration_ms = Histogram::with_opts(HistogramOpts::new(
            "transferarr_tick_duration_ms",
            "Wall-clock duration of a single reconciliation tick.",
        ))
        .map_err(|source| TelemetryError::metrics_register("tick_duration_ms", source))?;
        let copy_retries_total = IntCounter::with_opts(Opts::new(
            "transferarr_copy_retries_total",
            "Copy jobs retried after a transient failure.",
        ))
        .map_err(|source| TelemetryError::metrics_register("copy_retries_total", source))?;
        let unclaimed_drops_total = IntCounter::with_opts(Opts::new(
            "transferarr_unclaimed_drops_total",
            "Torrents dropped from tracking after exceeding the unclaimed tick budget.",
        ))
        .map_err(|source| TelemetryError::metrics_register("unclaimed_drops_total", source))?;
        let job_errors_total = IntCounterVec::new(
            Opts::new(
                "transferarr_job_errors_total",
                "Terminal job failures, by error kind.",
            ),
            &["kind"],
        )
        .map_err(|source| TelemetryError::metrics_register("job_errors_total", source))?;

        registry
            .register(Box::new(tracked_torrents.clone()))
            .map_err(|source| TelemetryError::metrics_register("tracked_torrents", source))?;
        registry
            .register(Box::new(queue_depth.clone()))
            .map_err(|source| TelemetryError::metrics_register("queue_depth", source))?;
        registry
            .register(Box::new(copy_bytes_total.clone()))
            .map_err(|source| TelemetryError::metrics_register("copy_bytes_total", source))?;
        registry
            .register(Box::new(tick_duration_ms.clone()))
            .map_err(|source| TelemetryError::metrics_register("tick_duration_ms", source))?;
        registry
            .register(Box::new(copy_retries_total.clone()))
            .map_err(|source| TelemetryError::metrics_register("copy_retries_total", source))?;
        registry
            .register(Box::new(unclaimed_drops_total.clone()))
            .map_err(|source| TelemetryError::metrics_register("unclaimed_drops_total", source))?;
        registry
            .register(Box::new(job_errors_total.clone()))
            .map_err(|source| TelemetryError::metrics_register("job_errors_total", source))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                tracked_torrents,
                queue_depth,
                copy_bytes_total,
                tick_duration_ms,
                copy_retries_total,
                unclaimed_drops_total,
                job_errors_total,
            }),
        })
    }

    /// Sets the tracked-torrent gauge for `connection`.
    pub fn set_tracked_torrents(&self, connection: &str, count: i64) {
        self.inner
            .tracked_torrents
            .with_label_values(&[connection])
            .set(count);
    }

    /// Sets the queue-depth gauge for `connection`.
    pub fn set_queue_depth(&self, connection: &str, depth: i64) {
        self.inner
            .queue_depth
            .with_label_values(&[connection])
            .set(depth);
    }

    /// Adds `bytes` to the copy-bytes counter for `connection`.
    pub fn add_copy_bytes(&self, connection: &str, bytes: u64) {
        self.inner
            .copy_bytes_total
            .with_label_values(&[connection])
            .inc_by(bytes);
    }

    /// Records the duration of one reconciliation tick, in milliseconds.
    pub fn observe_tick_duration_ms(&self, millis: f64) {
        self.inner.tick_duration_ms.observe(millis);
    }

    /// Increments the copy-retry counter.
    pub fn inc_copy_retry(&self) {
        self.inner.copy_retries_total.inc();
    }

    /// Increments the unclaimed-drop counter.
    pub fn inc_unclaimed_drop(&self) {
        self.inner.unclaimed_drops_total.inc();
    }

    /// Increments the job-error counter for `kind` (e.g. `copy_failed`,
    /// `metainfo_missing`, `fatal`).
    pub fn inc_job_error(&self, kind: &str) {
        self.inner.job_errors_total.with_label_values(&[kind]).inc();
    }

    /// Renders the registry in Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::MetricsEncode`] or
    /// [`TelemetryError::MetricsUtf8`] if encoding fails.
    pub fn render(&self) -> Result<String> {
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(TelemetryError::metrics_encode)?;
        String::from_utf8(buffer).map_err(TelemetryError::metrics_utf8)
    }

    /// Takes a point-in-time snapshot summed across all connections.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let sum = |family: &IntGaugeVec| -> i64 {
            family
                .collect()
                .into_iter()
                .flat_map(|mf| mf.get_metric().to_vec())
                .map(|m| m.get_gauge().get_value() as i64)
                .sum()
        };
        MetricsSnapshot {
            tracked_torrents: sum(&self.inner.tracked_torrents),
            total_queue_depth: sum(&self.inner.queue_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.set_tracked_torrents("plex-to-archive", 5);
        metrics.set_queue_depth("plex-to-archive", 2);
        metrics.add_copy_bytes("plex-to-archive", 4_096);
        metrics.observe_tick_duration_ms(12.5);
        metrics.inc_copy_retry();
        metrics.inc_unclaimed_drop();
        metrics.inc_job_error("copy_failed");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tracked_torrents, 5);
        assert_eq!(snapshot.total_queue_depth, 2);

        let rendered = metrics.render()?;
        assert!(rendered.contains("transferarr_tracked_torrents"));
        assert!(rendered.contains("transferarr_copy_retries_total 1"));
        assert!(rendered.contains("transferarr_job_errors_total"));
        Ok(())
    }

    #[test]
    fn snapshot_sums_across_connections() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.set_queue_depth("a", 1);
        metrics.set_queue_depth("b", 4);
        assert_eq!(metrics.snapshot().total_queue_depth, 5);
        Ok(())
    }
}
