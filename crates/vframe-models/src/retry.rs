//! Startup connection retries.
//!
//! Infrastructure (ledger store, queue) is retried a fixed number of times
//! with a fixed delay before the process gives up.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for connection retry behavior.
#[derive(Debug, Clone)]
pub struct ConnectRetry {
    /// Total number of attempts, including the first one.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Target name for logging.
    pub target: String,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
            target: "service".to_string(),
        }
    }
}

impl ConnectRetry {
    /// Create a retry policy for the given target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Read `CONNECT_RETRIES` and `CONNECT_RETRY_DELAY_SECS`.
    pub fn from_env(target: impl Into<String>) -> Self {
        let defaults = Self::new(target);
        Self {
            attempts: std::env::var("CONNECT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.attempts),
            delay: Duration::from_secs(
                std::env::var("CONNECT_RETRY_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.delay.as_secs()),
            ),
            ..defaults
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Run `connect` until it succeeds or attempts are exhausted.
///
/// Returns the last error when every attempt failed.
pub async fn retry_connect<F, Fut, T, E>(policy: &ConnectRetry, connect: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match connect().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(target_name = %policy.target, attempt, "Connected after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Failed to connect to {} (attempt {}/{}): {}. Retrying in {:?}",
                    policy.target, attempt, attempts, e, policy.delay
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_immediate_success() {
        let policy = ConnectRetry::new("db");
        let calls = AtomicU32::new(0);

        let result = retry_connect(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let policy = ConnectRetry::new("db").with_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_connect(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("connection refused")
                } else {
                    Ok("pool")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "pool");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_fixed_attempts() {
        let policy = ConnectRetry::new("queue")
            .with_attempts(3)
            .with_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_connect(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("down {n}")) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "down 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
