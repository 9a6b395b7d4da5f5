//! Assembles the configured endpoints, transports, media managers and
//! connections into a running [`transferarr_orchestrator::Orchestrator`],
//! and drives it until a shutdown signal arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use transferarr_config::{
    ConnectionConfig, DownloadClientConfig, KIND_MOVIES, KIND_SERIES, MediaManagerConfig,
    RawConfig,
};
use transferarr_endpoint::EndpointClient;
use transferarr_endpoint::qbittorrent::{QBittorrentConfig, QBittorrentEndpoint};
use transferarr_endpoint::transmission::{TransmissionConfig, TransmissionEndpoint};
use transferarr_events::{HistorySink, JsonlHistorySink};
use transferarr_executor::{ConnectionContext, Executor};
use transferarr_manager::radarr::RadarrAdapter;
use transferarr_manager::sonarr::SonarrAdapter;
use transferarr_manager::{MediaManagerAdapter, RadarrConfig, SonarrConfig};
use transferarr_orchestrator::{ConnectionRegistration, Orchestrator, OrchestratorConfig};
use transferarr_record::TorrentStore;
use transferarr_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use transferarr_transport::{SftpTransport, Transport, TransportDescriptor};

use crate::cli::Cli;
use crate::error::AppError;

/// Time allotted for in-flight copy jobs to finish once shutdown begins.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
/// Copy-job queue depth relative to a connection's worker count.
const QUEUE_CAPACITY_PER_WORKER: usize = 4;
/// Name of the history log file written under the state directory.
const HISTORY_LOG_FILE: &str = "history.jsonl";

/// Parses configuration, wires every collaborator, and runs the
/// reconciliation driver until interrupted.
///
/// # Errors
///
/// Returns [`AppError`] for any failure during bootstrap; the binary
/// translates the variant into the process exit code.
pub async fn run(cli: &Cli) -> Result<(), AppError> {
    install_logging(cli)?;

    let config = transferarr_config::load(&cli.config)?;
    let metrics = Metrics::new()?;

    let store = Arc::new(TorrentStore::open(&cli.state_dir).await?);
    let history_path = cli.state_dir.join(HISTORY_LOG_FILE);
    let history: Arc<dyn HistorySink> =
        Arc::new(JsonlHistorySink::open(&history_path).map_err(|source| {
            AppError::HistoryLog {
                path: history_path.clone(),
                source,
            }
        })?);

    let call_timeout = config.tunables.call_timeout();
    let endpoints = build_endpoints(&config, call_timeout)?;
    let managers = build_managers(&config, call_timeout)?;
    let (registrations, executors) = build_connections(
        &config,
        &endpoints,
        Arc::clone(&store),
        Arc::clone(&history),
        metrics.clone(),
    )?;

    let mut orchestrator_config = OrchestratorConfig {
        tick_interval: config.tunables.tick_interval(),
        k_unclaimed: config.tunables.k_unclaimed,
        k_copy_retry: config.tunables.k_copy_retry,
        k_post_ingest_ticks: config.tunables.k_post_ingest_ticks,
        call_timeout,
    };
    if let Some(tick_ms) = cli.tick_ms {
        orchestrator_config.tick_interval = Duration::from_millis(tick_ms);
    }

    let mut endpoint_list: Vec<(String, Arc<dyn EndpointClient>)> =
        endpoints.into_iter().collect();
    endpoint_list.sort_by(|a, b| a.0.cmp(&b.0));

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        endpoint_list,
        managers,
        registrations,
        orchestrator_config,
        metrics.clone(),
    )?;

    metrics.set_tracked_torrents("_all", i64::try_from(store.snapshot().await.len()).unwrap_or(i64::MAX));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    orchestrator.run(shutdown_rx).await;
    drop(orchestrator);

    for executor in executors {
        if let Ok(executor) = Arc::try_unwrap(executor) {
            executor.shutdown(SHUTDOWN_DEADLINE).await;
        }
    }

    Ok(())
}

fn install_logging(cli: &Cli) -> Result<(), AppError> {
    let format = cli.log_format.unwrap_or_else(LogFormat::infer);
    let config = LoggingConfig {
        level: transferarr_telemetry::DEFAULT_LOG_LEVEL,
        format,
    };
    init_logging(&config)?;
    Ok(())
}

fn build_endpoints(
    config: &RawConfig,
    call_timeout: Duration,
) -> Result<HashMap<String, Arc<dyn EndpointClient>>, AppError> {
    let mut endpoints: HashMap<String, Arc<dyn EndpointClient>> = HashMap::new();
    for (name, client) in &config.download_clients {
        let endpoint = build_endpoint(name, client, call_timeout)?;
        endpoints.insert(name.clone(), endpoint);
    }
    Ok(endpoints)
}

fn build_endpoint(
    name: &str,
    config: &DownloadClientConfig,
    timeout: Duration,
) -> Result<Arc<dyn EndpointClient>, AppError> {
    match config.kind.as_str() {
        "qbittorrent" => Ok(Arc::new(QBittorrentEndpoint::new(
            name,
            QBittorrentConfig {
                base_url: config.base_url(),
                username: config.username.clone().unwrap_or_default(),
                password: config.password.clone().unwrap_or_default(),
                timeout,
            },
        ))),
        "transmission" => Ok(Arc::new(TransmissionEndpoint::new(
            name,
            TransmissionConfig {
                base_url: config.base_url(),
                username: config.username.clone(),
                password: config.password.clone(),
                timeout,
            },
        ))),
        other => Err(AppError::UnsupportedKind {
            field: format!("download_clients.{name}.kind"),
            kind: other.to_string(),
        }),
    }
}

fn build_managers(
    config: &RawConfig,
    call_timeout: Duration,
) -> Result<Vec<Arc<dyn MediaManagerAdapter>>, AppError> {
    config
        .media_managers
        .iter()
        .map(|manager| build_manager(manager, call_timeout))
        .collect()
}

fn build_manager(
    config: &MediaManagerConfig,
    timeout: Duration,
) -> Result<Arc<dyn MediaManagerAdapter>, AppError> {
    let base_url = format!("http://{}:{}", config.host, config.port);
    match config.kind.as_str() {
        KIND_MOVIES => Ok(Arc::new(RadarrAdapter::new(RadarrConfig {
            base_url,
            api_key: config.api_key.clone(),
            timeout,
        }))),
        KIND_SERIES => Ok(Arc::new(SonarrAdapter::new(SonarrConfig {
            base_url,
            api_key: config.api_key.clone(),
            timeout,
        }))),
        other => Err(AppError::UnsupportedKind {
            field: "media_managers[].kind".to_string(),
            kind: other.to_string(),
        }),
    }
}

fn build_transport(
    name: &str,
    descriptor: &TransportDescriptor,
) -> Result<Arc<dyn Transport>, AppError> {
    match descriptor {
        TransportDescriptor::Local => Ok(Arc::new(transferarr_transport::LocalTransport::new("/"))),
        TransportDescriptor::Sftp(sftp) => {
            Ok(Arc::new(SftpTransport::from_descriptor(name, sftp)?))
        }
    }
}

type Connections = (Vec<ConnectionRegistration>, Vec<Arc<Executor>>);

fn build_connections(
    config: &RawConfig,
    endpoints: &HashMap<String, Arc<dyn EndpointClient>>,
    store: Arc<TorrentStore>,
    history: Arc<dyn HistorySink>,
    metrics: Metrics,
) -> Result<Connections, AppError> {
    let mut names: Vec<&String> = config.connections.keys().collect();
    names.sort();

    let mut registrations = Vec::with_capacity(names.len());
    let mut executors = Vec::with_capacity(names.len());

    for name in names {
        let connection = &config.connections[name];
        let target_endpoint =
            endpoints
                .get(&connection.to)
                .cloned()
                .ok_or_else(|| AppError::UnsupportedKind {
                    field: format!("connections.{name}.to"),
                    kind: connection.to.clone(),
                })?;

        let context = ConnectionContext {
            name: name.clone(),
            home_name: connection.from.clone(),
            target_name: connection.to.clone(),
            source: build_transport(&format!("{name}-source"), &connection.transfer_config.from)?,
            target: build_transport(&format!("{name}-target"), &connection.transfer_config.to)?,
            target_endpoint,
            source_metainfo_dir: path_string(connection, |c| &c.source_metainfo_dir),
            source_payload_dir: path_string(connection, |c| &c.source_payload_dir),
            target_metainfo_tmp_dir: path_string(connection, |c| &c.target_metainfo_tmp_dir),
            target_payload_dir: path_string(connection, |c| &c.target_payload_dir),
            progress_interval: config.tunables.progress_throttle(),
            metrics: metrics.clone(),
        };

        let worker_count = config.tunables.worker_count;
        let queue_capacity = worker_count.max(1) * QUEUE_CAPACITY_PER_WORKER;
        let executor = Arc::new(Executor::spawn(
            Arc::new(context),
            Arc::clone(&store),
            Arc::clone(&history),
            worker_count,
            queue_capacity,
        ));

        registrations.push(ConnectionRegistration {
            name: name.clone(),
            from: connection.from.clone(),
            to: connection.to.clone(),
            executor: Arc::clone(&executor),
        });
        executors.push(executor);
    }

    Ok((registrations, executors))
}

fn path_string(
    connection: &ConnectionConfig,
    select: impl Fn(&ConnectionConfig) -> &std::path::PathBuf,
) -> String {
    select(connection).to_string_lossy().into_owned()
}
