//! Storesight - retail movement intelligence pipeline
//!
//! Converts per-frame tracked-object observations into movement events and
//! time-windowed operational KPIs.
//!
//! Module structure:
//! - `domain/` - Core business types (Region, MovementEvent, KpiSnapshot)
//! - `io/` - External interfaces (frame sources, ingestion boundary, dispatch)
//! - `services/` - Business logic (RoiTracker, pipelines, aggregation, ETL)
//! - `infra/` - Infrastructure (Config, Metrics, error taxonomy)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use storesight::infra::{Config, DispatchMode, Metrics};
use storesight::io::{create_dispatcher, HttpIngestionClient, IngestionClient, JsonlFrameSource};
use storesight::services::etl::LocalIngestionClient;
use storesight::services::{EtlRunner, InMemoryEventStore, InMemoryKpiStore, StreamPipeline};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const METRICS_INTERVAL_SECS: u64 = 60;

/// Storesight - movement events and branch KPIs from tracker output
#[derive(Parser, Debug)]
#[command(name = "storesight", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml", env = "CONFIG_FILE")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configurable level via RUST_LOG env var, default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("storesight starting");

    let args = Args::parse();
    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config))?;

    let mode_str = match config.dispatch().mode {
        DispatchMode::Http => "http",
        DispatchMode::Local => "local",
    };
    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        streams = config.streams().len(),
        regions = config.regions().len(),
        branches = config.branches().len(),
        min_hits = config.min_hits(),
        max_age = config.max_age(),
        confidence_threshold = config.confidence_threshold(),
        dispatch_mode = %mode_str,
        endpoint = %config.dispatch().endpoint,
        "config_loaded"
    );
    for region in config.regions() {
        info!(
            region_id = %region.id,
            branch_id = %region.branch_id,
            camera_id = %region.camera_id,
            kind = region.kind_str(),
            "region_loaded"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Ingestion boundary: HTTP in deployments, shared in-memory store in
    // local mode (events then feed the ETL scheduler directly)
    let mut local_store: Option<Arc<InMemoryEventStore>> = None;
    let client: Arc<dyn IngestionClient> = match config.dispatch().mode {
        DispatchMode::Http => Arc::new(HttpIngestionClient::new(
            &config.dispatch().endpoint,
            Duration::from_millis(config.dispatch().timeout_ms),
        )?),
        DispatchMode::Local => {
            let store = Arc::new(InMemoryEventStore::new());
            local_store = Some(store.clone());
            Arc::new(LocalIngestionClient::new(store))
        }
    };

    let (event_sender, dispatch_worker) =
        create_dispatcher(config.dispatch().clone(), client, metrics.clone());
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(dispatch_worker.run(worker_shutdown));

    // ETL scheduler runs against the in-memory store in local mode; with an
    // HTTP boundary the receiving side owns the persistent stores.
    if let Some(store) = local_store {
        let etl_interval = config.kpi().etl_interval_secs;
        if etl_interval > 0 {
            let runner = EtlRunner::new(
                store,
                Arc::new(InMemoryKpiStore::new()),
                config.branches().clone(),
                config.kpi().clone(),
                metrics.clone(),
            );
            let mut etl_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(std::time::Duration::from_secs(etl_interval));
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let window = runner.window_start_before(chrono::Utc::now());
                            runner.run_window(window).await;
                        }
                        _ = etl_shutdown.changed() => {
                            if *etl_shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    }

    // Metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(METRICS_INTERVAL_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.summary().log();
        }
    });

    // One sequential pipeline per configured stream
    let heartbeat = Duration::from_secs(config.heartbeat_interval_secs());
    let mut pipeline_handles = Vec::new();
    for stream in config.streams() {
        let regions = config.regions_for_camera(&stream.camera_id);
        if regions.is_empty() {
            error!(stream_id = %stream.id, camera_id = %stream.camera_id, "stream_has_no_regions");
            continue;
        }
        let source = JsonlFrameSource::open(&stream.frames_file, &stream.id)
            .await
            .with_context(|| format!("failed to open frame source for stream {}", stream.id))?;
        let pipeline = StreamPipeline::new(
            &stream.id,
            source,
            regions,
            config.min_hits(),
            config.max_age(),
            config.confidence_threshold(),
            event_sender.clone(),
            metrics.clone(),
            heartbeat,
        );
        pipeline_handles.push(tokio::spawn(pipeline.run(shutdown_rx.clone())));
    }
    drop(event_sender);

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run until every stream ends or shutdown is signalled
    for handle in pipeline_handles {
        let _ = handle.await;
    }

    // Streams are done; release the dispatch worker so it drains and stops
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    metrics.summary().log();
    info!("storesight shutdown complete");
    Ok(())
}
