//! Redis pub/sub reload strategy: subscribes to a channel and treats each
//! message payload as the changed rule set id (an empty payload means
//! "everything"). Reconnects on connection loss with bounded exponential
//! backoff; only becomes a hard error after the retry budget is exhausted,
//! matching the teacher's general pattern of treating connectivity loss as
//! retryable and only escalating once retries run out.

use super::{ReloadListener, ReloadStrategy};
use crate::error::{FluxGateError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct PubSubReloadStrategy {
    redis_url: String,
    channel: String,
    max_reconnect_attempts: u32,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl PubSubReloadStrategy {
    pub fn new(redis_url: impl Into<String>, channel: impl Into<String>, max_reconnect_attempts: u32) -> Self {
        Self {
            redis_url: redis_url.into(),
            channel: channel.into(),
            max_reconnect_attempts,
            handle: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn subscribe_loop(
        redis_url: String,
        channel: String,
        max_attempts: u32,
        running: Arc<AtomicBool>,
        listener: Arc<dyn ReloadListener>,
    ) -> Result<()> {
        let mut attempt = 0u32;

        while running.load(Ordering::SeqCst) {
            match Self::run_once(&redis_url, &channel, &running, listener.clone()).await {
                Ok(()) => return Ok(()), // stopped cleanly
                Err(err) => {
                    attempt += 1;
                    if attempt > max_attempts {
                        error!(error = %err, attempts = attempt, "pubsub reconnect budget exhausted");
                        return Err(FluxGateError::StoreFatal(format!(
                            "pubsub reconnect budget exhausted: {err}"
                        )));
                    }
                    let backoff = Duration::from_millis(200 * 2u64.saturating_pow(attempt.min(10)));
                    warn!(error = %err, attempt, backoff_ms = backoff.as_millis() as u64, "pubsub connection lost, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        Ok(())
    }

    async fn run_once(
        redis_url: &str,
        channel: &str,
        running: &Arc<AtomicBool>,
        listener: Arc<dyn ReloadListener>,
    ) -> Result<()> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FluxGateError::ConfigError(format!("invalid redis url: {e}")))?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        info!(channel, "subscribed to rule change notifications");

        let mut stream = pubsub.on_message();
        while running.load(Ordering::SeqCst) {
            match tokio::time::timeout(Duration::from_secs(5), stream.next()).await {
                Ok(Some(msg)) => {
                    let payload: String = msg.get_payload().unwrap_or_default();
                    let rule_set_id = if payload.is_empty() { None } else { Some(payload) };
                    listener.on_rule_changed(rule_set_id).await;
                }
                Ok(None) => return Err(FluxGateError::StoreTransient("pubsub stream closed".to_string())),
                Err(_timeout) => continue, // idle tick, re-check `running`
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReloadStrategy for PubSubReloadStrategy {
    async fn start(&self, listener: Arc<dyn ReloadListener>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let redis_url = self.redis_url.clone();
        let channel = self.channel.clone();
        let max_attempts = self.max_reconnect_attempts;
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            if let Err(err) = Self::subscribe_loop(redis_url, channel, max_attempts, running, listener).await {
                error!(error = %err, "pubsub reload strategy terminated");
            }
        });

        *self.handle.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}
