//! Frame extraction worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vframe_ledger::{JobLedger, LedgerConfig, PgJobLedger};
use vframe_media::FfmpegFrameExtractor;
use vframe_models::{retry_connect, ConnectRetry};
use vframe_queue::{JobPublisher, LogNotifier, NotificationSink, RedisJobQueue, RedisNotifier};
use vframe_storage::ArtifactStore;
use vframe_worker::{metrics, JobExecutor, JobProcessor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS connections)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "vframe=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vframe-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!("Serving metrics on {}", addr),
            Err(e) => error!("Failed to start metrics exporter: {}", e),
        }
    }

    let store = ArtifactStore::from_env();
    if let Err(e) = store.ensure_dirs().await {
        error!("Failed to prepare storage directories: {}", e);
        std::process::exit(1);
    }

    let ledger_config = LedgerConfig::from_env();
    let ledger = match retry_connect(&ConnectRetry::from_env("postgres"), || {
        PgJobLedger::connect(&ledger_config)
    })
    .await
    {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("Failed to connect to ledger: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match RedisJobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    let queue_ref = &queue;
    if let Err(e) = retry_connect(&ConnectRetry::from_env("redis"), || async move {
        queue_ref.ping().await?;
        queue_ref.init().await
    })
    .await
    {
        error!("Failed to initialize job queue: {}", e);
        std::process::exit(1);
    }

    let notifier: Arc<dyn NotificationSink> = match std::env::var("NOTIFY_SINK").as_deref() {
        Ok("log") => Arc::new(LogNotifier),
        _ => match RedisNotifier::from_env() {
            Ok(notifier) => Arc::new(notifier),
            Err(e) => {
                error!("Failed to create notifier: {}", e);
                std::process::exit(1);
            }
        },
    };

    let (abort_tx, abort_rx) = watch::channel(false);
    let extractor = FfmpegFrameExtractor::new(config.extract_timeout).with_cancel(abort_rx);

    let ledger: Arc<dyn JobLedger> = Arc::new(ledger);
    let processor = JobProcessor::new(ledger, store, Arc::new(extractor), notifier);
    let executor = Arc::new(JobExecutor::new(config, queue, processor).with_abort(abort_tx));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
