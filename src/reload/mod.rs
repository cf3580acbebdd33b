//! # Reload Strategy
//!
//! Keeps the Rule Cache in sync with the Rule Store without a full restart.
//! Two real strategies (polling, Redis pub/sub) plus a no-op for
//! deployments that don't need hot reload, following the same
//! trait-plus-variants shape `psenger_throttler::algorithms` uses to let
//! callers swap the underlying policy without touching call sites.

mod none;
mod polling;
mod pubsub;

pub use none::NoneReloadStrategy;
pub use polling::PollingReloadStrategy;
pub use pubsub::PubSubReloadStrategy;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Notified when a rule set changes. `rule_set_id` of `None` means "assume
/// everything changed" (used for listener-failure recovery and startup).
#[async_trait]
pub trait ReloadListener: Send + Sync {
    async fn on_rule_changed(&self, rule_set_id: Option<String>);
}

/// Starts and stops idempotently; `start` may be called once per instance,
/// `stop` any number of times after that.
#[async_trait]
pub trait ReloadStrategy: Send + Sync {
    async fn start(&self, listener: Arc<dyn ReloadListener>) -> Result<()>;
    async fn stop(&self);
}
