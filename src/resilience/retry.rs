//! Retry with exponential backoff, retryable-errors only. Built
//! on the `backoff` crate's `ExponentialBackoff` rather than hand-rolling
//! jittered sleeps.

use crate::error::{FluxGateError, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(2),
        }
    }
}

pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `operation` up to `max_attempts` times, retrying only when the
    /// returned error `is_retryable()`. Non-retryable errors and a
    /// disabled retrier both short-circuit to a single attempt.
    pub async fn call<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.config.enabled {
            return operation().await;
        }

        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            multiplier: self.config.multiplier,
            max_interval: self.config.max_backoff,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    let wait = backoff.next_backoff().unwrap_or(self.config.max_backoff);
                    debug!(attempt, backoff_ms = wait.as_millis() as u64, error = %err, "retrying after transient error");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let retrier = Retrier::new(RetryConfig { initial_backoff: Duration::from_millis(1), ..Default::default() });
        let calls = AtomicU32::new(0);

        let result: Result<&'static str> = retrier
            .call(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FluxGateError::StoreTransient("down".to_string()))
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_fatal_errors() {
        let retrier = Retrier::new(RetryConfig::default());
        let calls = AtomicU32::new(0);

        let result: Result<()> = retrier
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FluxGateError::InvalidArgument("bad".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let retrier = Retrier::new(RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        });
        let calls = AtomicU32::new(0);

        let result: Result<()> = retrier
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FluxGateError::StoreTransient("down".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
