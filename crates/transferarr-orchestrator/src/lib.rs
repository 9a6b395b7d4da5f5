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

//! Tick-based reconciliation driver moving torrents through the migration
//! lifecycle.
//!
//! Every other component in this workspace is mechanical: endpoints report
//! native state, the executor moves bytes, media managers report queues.
//! The [`Orchestrator`] is the one place that decides what a torrent's
//! state *should* be this tick and acts on the difference. It owns every
//! field on a [`transferarr_record::TorrentRecord`] except `progress_view`
//! and the terminal outcome of its own job, which an executor worker is
//! allowed to write directly.

pub mod error;
mod reconcile;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use transferarr_endpoint::{EndpointClient, TorrentSummary};
use transferarr_executor::Executor;
use transferarr_manager::MediaManagerAdapter;
use transferarr_record::{InfoHash, TorrentState, TorrentStore};
use transferarr_telemetry::Metrics;

pub use error::{OrchestratorError, OrchestratorResult};

/// Tunable timings and budgets governing one orchestrator instance.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Wall-clock period between ticks.
    pub tick_interval: Duration,
    /// Consecutive ticks a record may go unlocated before it is dropped.
    pub k_unclaimed: u32,
    /// Consecutive copy-job failures a record may accumulate before it is
    /// moved to `ERROR` instead of retried.
    pub k_copy_retry: u32,
    /// Ticks a record must spend resolved on its target before retirement
    /// is considered, even once the manager reports it ingested.
    pub k_post_ingest_ticks: u32,
    /// Upper bound on any single call out to an endpoint or manager.
    pub call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            k_unclaimed: 10,
            k_copy_retry: 3,
            k_post_ingest_ticks: 2,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// One configured migration path: payloads move from `from` to `to` through
/// `executor`'s worker pool.
pub struct ConnectionRegistration {
    /// The connection's configured name, used only in logs.
    pub name: String,
    /// Name of the home-side endpoint this connection copies from.
    pub from: String,
    /// Name of the target-side endpoint this connection copies to.
    pub to: String,
    /// The worker pool that runs copy jobs for this connection.
    pub executor: Arc<Executor>,
}

/// This tick's listing for one endpoint: either everything it reported, or
/// a record that the call failed so every locate decision that would rely
/// on its absence is deferred rather than treated as "not there".
pub(crate) struct EndpointListing {
    pub(crate) summaries: HashMap<String, TorrentSummary>,
    pub(crate) available: bool,
}

/// Drives every tracked torrent through the migration lifecycle, one tick
/// at a time.
pub struct Orchestrator {
    store: Arc<TorrentStore>,
    endpoint_order: Vec<String>,
    endpoints: Vec<(String, Arc<dyn EndpointClient>)>,
    managers: Vec<Arc<dyn MediaManagerAdapter>>,
    connections: Vec<ConnectionRegistration>,
    config: OrchestratorConfig,
    target_resolved_ticks: Mutex<HashMap<InfoHash, u32>>,
    metrics: Metrics,
}

impl Orchestrator {
    /// Assembles a driver from its registered collaborators.
    ///
    /// `endpoints` order matters: it is the tie-break configuration order
    /// used to resolve which endpoint is "home" when more than one reports
    /// a hash.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if a connection names the same
    /// endpoint as both its source and target, or refers to an endpoint
    /// that was never registered.
    pub fn new(
        store: Arc<TorrentStore>,
        endpoints: Vec<(String, Arc<dyn EndpointClient>)>,
        managers: Vec<Arc<dyn MediaManagerAdapter>>,
        connections: Vec<ConnectionRegistration>,
        config: OrchestratorConfig,
        metrics: Metrics,
    ) -> OrchestratorResult<Self> {
        for connection in &connections {
            if connection.from == connection.to {
                return Err(OrchestratorError::SameEndpoint {
                    name: connection.name.clone(),
                    endpoint: connection.from.clone(),
                });
            }
            for endpoint_name in [&connection.from, &connection.to] {
                if !endpoints.iter().any(|(name, _)| name == endpoint_name) {
                    return Err(OrchestratorError::UnknownEndpoint {
                        name: connection.name.clone(),
                        endpoint: endpoint_name.clone(),
                    });
                }
            }
        }

        let endpoint_order = endpoints.iter().map(|(name, _)| name.clone()).collect();
        Ok(Self {
            store,
            endpoint_order,
            endpoints,
            managers,
            connections,
            config,
            target_resolved_ticks: Mutex::new(HashMap::new()),
            metrics,
        })
    }

    /// Runs ticks on `config.tick_interval` until `shutdown` fires.
    ///
    /// No new transition is started once shutdown is requested; any tick
    /// already in progress is allowed to finish.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("orchestrator stopping: shutdown requested");
                        break;
                    }
                }
            }
        }
    }

    /// Runs exactly one reconciliation pass: ingest, locate, drop-stale,
    /// advance, then a retirement sweep over already-resolved records.
    ///
    /// Individual record mutations persist themselves as they happen
    /// through [`TorrentStore`], so there is no separate batch-commit step.
    pub async fn tick(&self) {
        let started = std::time::Instant::now();
        self.ingest().await;

        let listings = self.collect_endpoint_listings().await;
        if !self.endpoints.is_empty() && listings.values().all(|listing| !listing.available) {
            warn!("every configured endpoint failed to respond this tick, skipping reconciliation");
            return;
        }

        let snapshot = self.store.snapshot().await;
        self.metrics.set_tracked_torrents("_all", i64::try_from(snapshot.len()).unwrap_or(i64::MAX));
        let hashes: Vec<InfoHash> = snapshot.into_iter().map(|record| record.hash).collect();
        for hash in hashes {
            self.reconcile_one(&hash, &listings).await;
        }

        self.process_retirements().await;
        for connection in &self.connections {
            self.metrics.set_queue_depth(&connection.name, i64::try_from(connection.executor.queue_depth()).unwrap_or(i64::MAX));
        }
        self.metrics.observe_tick_duration_ms(started.elapsed().as_secs_f64() * 1000.0);
    }

    async fn ingest(&self) {
        for manager in &self.managers {
            let kind = manager.kind();
            let Some(items) = with_timeout(self.config.call_timeout, kind, manager.queue()).await else {
                continue;
            };
            for item in items {
                let hash = match InfoHash::parse(&item.hash) {
                    Ok(hash) => hash,
                    Err(error) => {
                        warn!(raw_hash = %item.hash, %error, "manager reported an invalid info hash, skipping");
                        continue;
                    }
                };

                let refreshed = self
                    .store
                    .mutate(&hash, |record| {
                        record.name = item.name.clone();
                        record.manager_queue_id = item.queue_id.clone();
                    })
                    .await;

                match refreshed {
                    Ok(Some(())) => {}
                    Ok(None) => {
                        let record = transferarr_record::TorrentRecord::new_manager_queued(
                            hash.clone(),
                            item.name,
                            kind.to_string(),
                            item.queue_id,
                        );
                        if let Err(error) = self.store.upsert(record).await {
                            error!(%hash, %error, "failed to persist newly ingested record");
                        }
                    }
                    Err(error) => error!(%hash, %error, "failed to persist manager-refreshed record"),
                }
            }
        }
    }

    async fn collect_endpoint_listings(&self) -> HashMap<String, EndpointListing> {
        let mut listings = HashMap::with_capacity(self.endpoints.len());
        for (name, client) in &self.endpoints {
            let listing = match with_timeout(self.config.call_timeout, name.as_str(), client.list()).await {
                Some(summaries) => EndpointListing { summaries, available: true },
                None => EndpointListing { summaries: HashMap::new(), available: false },
            };
            listings.insert(name.clone(), listing);
        }
        listings
    }

    async fn reconcile_one(&self, hash: &InfoHash, listings: &HashMap<String, EndpointListing>) {
        let outcome = self
            .store
            .mutate(hash, |record| {
                reconcile::reconcile(record, &self.endpoint_order, listings, &self.connections, &self.config)
            })
            .await;

        match outcome {
            Ok(Some(reconcile::Outcome::DropUnclaimed)) => {
                self.metrics.inc_unclaimed_drop();
                if let Err(error) = self.store.remove(hash).await {
                    error!(%hash, %error, "failed to drop unclaimed record");
                } else {
                    info!(%hash, "dropped record after exceeding the unclaimed-tick budget");
                }
            }
            Ok(Some(reconcile::Outcome::Retried)) => self.metrics.inc_copy_retry(),
            Ok(_) => {}
            Err(error) => error!(%hash, %error, "failed to persist reconciliation"),
        }
    }

    /// Retires records that have sat on a resolved target for at least
    /// `k_post_ingest_ticks` ticks, once the owning manager confirms it no
    /// longer needs the source copy.
    ///
    /// The tick counter lives only in memory: losing it across a restart
    /// means retirement waits a little longer next time, never less, so a
    /// crash can at worst delay a removal, never duplicate or skip one.
    async fn process_retirements(&self) {
        let resolved: Vec<_> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|record| record.state.implies_target_resolved())
            .collect();

        let mut ticks = self.target_resolved_ticks.lock().await;
        let still_resolved: std::collections::HashSet<_> = resolved.iter().map(|record| record.hash.clone()).collect();
        ticks.retain(|hash, _| still_resolved.contains(hash));
        for record in &resolved {
            *ticks.entry(record.hash.clone()).or_insert(0) += 1;
        }
        let elapsed_ticks = ticks.clone();
        drop(ticks);

        for record in resolved {
            let TorrentState::Target(native) = record.state else { continue };
            if !native.is_seeding_like() {
                continue;
            }
            if elapsed_ticks.get(&record.hash).copied().unwrap_or(0) < self.config.k_post_ingest_ticks {
                continue;
            }

            let Some(adapter) = self.managers.iter().find(|adapter| adapter.kind() == record.manager_kind) else {
                continue;
            };
            let ready = with_timeout(
                self.config.call_timeout,
                adapter.kind(),
                adapter.ready_to_remove(&record.manager_queue_id),
            )
            .await
            .unwrap_or(false);
            if !ready {
                continue;
            }

            let Some(home_name) = record.home_client.clone() else { continue };
            let Some((_, home_client)) = self.endpoints.iter().find(|(name, _)| *name == home_name) else {
                continue;
            };

            match home_client.remove(record.hash.as_str(), true).await {
                Ok(()) => {
                    self.target_resolved_ticks.lock().await.remove(&record.hash);
                    if let Err(error) = self.store.remove(&record.hash).await {
                        error!(hash = %record.hash, %error, "failed to persist retirement");
                    } else {
                        info!(hash = %record.hash, "retired torrent after ingest confirmation");
                    }
                }
                Err(error) => warn!(hash = %record.hash, %error, "home endpoint removal failed, retrying next tick"),
            }
        }
    }
}

/// Runs `future` under `timeout`, treating both a timeout and an `Err`
/// result as transient: log and return `None` so the caller skips this
/// collaborator for the current tick rather than failing it.
async fn with_timeout<T, E: fmt::Display>(
    timeout: Duration,
    label: &str,
    future: impl Future<Output = Result<T, E>>,
) -> Option<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            warn!(collaborator = label, %error, "call failed, treating as transient");
            None
        }
        Err(_) => {
            warn!(collaborator = label, ?timeout, "call timed out, treating as transient");
            None
        }
    }
}
