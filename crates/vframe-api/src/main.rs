//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vframe_api::{create_router, metrics, ApiConfig, AppState};
use vframe_ledger::{LedgerConfig, PgJobLedger};
use vframe_models::{retry_connect, ConnectRetry};
use vframe_queue::{JobPublisher, RedisJobQueue};
use vframe_storage::ArtifactStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for TLS connections)
    let _ = rustls::crypto::ring::default_provider().install_default();

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

    info!("Starting vframe-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

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
        Ok(q) => q,
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

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                error!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(config.clone(), Arc::new(ledger), Arc::new(queue), store);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
