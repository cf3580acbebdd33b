//! Polling reload strategy: a single background task wakes up on a fixed
//! interval and tells the listener to assume everything may have changed,
//! letting the Rule Cache's own TTL/coalescing do the rest. Simpler and
//! less timely than pub/sub, but needs nothing from the Rule Store beyond
//! what it already offers.

use super::{ReloadListener, ReloadStrategy};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub struct PollingReloadStrategy {
    interval: Duration,
    initial_delay: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl PollingReloadStrategy {
    pub fn new(interval: Duration, initial_delay: Duration) -> Self {
        Self {
            interval,
            initial_delay,
            handle: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl ReloadStrategy for PollingReloadStrategy {
    async fn start(&self, listener: Arc<dyn ReloadListener>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let interval = self.interval;
        let initial_delay = self.initial_delay;
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;

            // a plain `interval()` fires on a fixed schedule even while a
            // tick's own work is still running, letting ticks pile up
            // under load; sleeping between iterations instead serializes
            // them so a slow reload never overlaps the next one.
            while running.load(Ordering::SeqCst) {
                listener.on_rule_changed(None).await;
                info!("polling reload tick completed");
                tokio::time::sleep(interval).await;
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
