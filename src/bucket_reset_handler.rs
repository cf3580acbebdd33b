//! # Bucket Reset Handler
//!
//! A `ReloadListener` that clears bucket state for a changed rule set, so
//! a rule whose bands shrank doesn't leave stale over-large bucket state
//! behind. Registered alongside the Caching Provider; best-effort —
//! a failed reset is logged, never propagated, since a missed reset just
//! means a bucket catches up on its own over one window.

use crate::bucket_store::BucketStore;
use crate::reload::ReloadListener;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct BucketResetHandler {
    bucket_store: Arc<dyn BucketStore>,
}

impl BucketResetHandler {
    pub fn new(bucket_store: Arc<dyn BucketStore>) -> Self {
        Self { bucket_store }
    }
}

#[async_trait]
impl ReloadListener for BucketResetHandler {
    async fn on_rule_changed(&self, rule_set_id: Option<String>) {
        // `None` means "assume everything changed" (e.g. a polling tick),
        // per spec §4.8's "or the analogous prefix for a null id": the
        // empty string is a prefix of every bucket key, so this clears the
        // whole keyspace rather than silently skipping the reset.
        let prefix = match &rule_set_id {
            Some(id) => format!("{id}:"),
            None => String::new(),
        };
        if let Err(err) = self.bucket_store.reset_by_prefix(&prefix).await {
            warn!(rule_set_id = rule_set_id.as_deref(), error = %err, "bucket reset after rule change failed");
        }
    }
}
