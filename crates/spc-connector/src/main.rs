//! SharePoint Connector - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use spc_common::logging::{init_logging, LogConfig};
use spc_common::shutdown_signal;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use spc_connector::{
    auth::{TokenCache, TokenProvider},
    clients::{DestinationClient, GraphClient, SourceClient, UniqueClient},
    config::Config,
    health::{self, HealthFlag, HealthState},
    lock::{DistributedLock, PgLockBackend},
    metrics::{MetricsSink, PrometheusMetrics},
    pipeline::{steps::standard_steps, PipelineExecutor},
    queue::{JobQueue, PgJobQueue, QueueWorker, RetryPolicy},
    scanner::{ScanRunner, SharePointScanner},
    scheduler::ScanScheduler,
};

// ============================================================================
// Defaults
// ============================================================================

const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 60;
const DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "spc-connector", version, about = "SharePoint to ingestion store connector")]
struct Args {
    /// Run one locked scan and exit instead of serving
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set LOG_* variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .service_name("spc-connector")
        .filter_directives("spc_connector=debug,tower_http=info,sqlx=warn,reqwest=warn")
        .build()
        .with_env()
        .context("Invalid logging configuration")?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting SharePoint connector");

    let config = Config::load()?;
    info!(
        sites = config.sharepoint.sites.len(),
        scan_interval_secs = config.scan.interval_secs,
        concurrency = config.processing.concurrency,
        "Configuration loaded"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS))
        .connect(config.database.url.expose())
        .await?;
    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS))
        .build()?;

    let tokens: Arc<dyn TokenProvider> = Arc::new(TokenCache::from_config(&config, http.clone()));
    let source: Arc<dyn SourceClient> = Arc::new(GraphClient::new(
        http.clone(),
        &config.graph,
        &config.sharepoint,
        tokens.clone(),
    ));
    let destination: Arc<dyn DestinationClient> = Arc::new(UniqueClient::new(http, &config.unique));

    let metrics = Arc::new(PrometheusMetrics::new()?);
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    let health_flag = HealthFlag::new(sink.clone());

    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(
        db_pool.clone(),
        RetryPolicy::from_config(&config.processing),
        config.queue.visibility_timeout(),
        config.queue.failed_retention,
    ));

    let scanner: Arc<dyn ScanRunner> = Arc::new(SharePointScanner::new(
        config.sharepoint.sites.clone(),
        source.clone(),
        destination.clone(),
        tokens.clone(),
        queue.clone(),
        sink.clone(),
    ));
    let scheduler = ScanScheduler::new(
        DistributedLock::new(Arc::new(PgLockBackend::new(db_pool.clone()))),
        scanner,
        health_flag.clone(),
        config.scan.lock_key.clone(),
        config.scan.interval(),
    );

    if args.scan_once {
        let outcome = scheduler.run_tick(&CancellationToken::new()).await;
        info!(outcome = ?outcome, "Single scan finished");
        return Ok(());
    }

    let executor = PipelineExecutor::new(
        standard_steps(&config, tokens, source, destination),
        config.processing.step_timeout(),
        sink.clone(),
    );
    let worker = Arc::new(QueueWorker::new(
        queue,
        Arc::new(executor),
        sink,
        health_flag.clone(),
        config.processing.concurrency,
        config.queue.poll_interval(),
        Duration::from_secs(DEFAULT_RECLAIM_INTERVAL_SECS),
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));
    let scheduler_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    let app = health::router(HealthState::new(health_flag, metrics));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Health server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await;
    if let Err(ref e) = served {
        error!(error = %e, "Health server failed");
    }
    shutdown.cancel();

    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scan scheduler task failed");
    }
    if let Err(e) = worker_handle.await {
        error!(error = %e, "Queue worker task failed");
    }
    db_pool.close().await;
    served?;

    info!("SharePoint connector shut down gracefully");

    Ok(())
}
