//! Worker configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Hard limit on one extraction run
    pub extract_timeout: Duration,
    /// How long one queue read blocks
    pub receive_block: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Prometheus listener; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            extract_timeout: Duration::from_secs(600), // 10 minutes
            receive_block: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(900), // must exceed extract_timeout
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            extract_timeout: secs("WORKER_EXTRACT_TIMEOUT_SECS", defaults.extract_timeout),
            receive_block: defaults.receive_block,
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            claim_min_idle: secs("WORKER_CLAIM_MIN_IDLE_SECS", defaults.claim_min_idle),
            metrics_addr: std::env::var("WORKER_METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}
