//! # Caching Provider
//!
//! Glues the Rule Cache to a Reload Strategy: registers itself as the
//! strategy's listener and forwards every change notification as a cache
//! invalidation. This is the only thing that ever calls
//! `RuleCache::invalidate` outside of tests.

use crate::error::Result;
use crate::model::RuleSet;
use crate::reload::{ReloadListener, ReloadStrategy};
use crate::rule_cache::RuleCache;
use async_trait::async_trait;
use std::sync::Arc;

pub struct CachingProvider {
    cache: Arc<RuleCache>,
    reload_strategy: Arc<dyn ReloadStrategy>,
    /// A second listener notified after the cache is invalidated, e.g. the
    /// Bucket Reset Handler. The Reload Strategy only ever holds one
    /// listener reference, so fanning out to more than the cache happens
    /// here rather than by registering several listeners with the strategy.
    downstream: Option<Arc<dyn ReloadListener>>,
}

impl CachingProvider {
    pub fn new(cache: Arc<RuleCache>, reload_strategy: Arc<dyn ReloadStrategy>) -> Self {
        Self { cache, reload_strategy, downstream: None }
    }

    pub fn with_downstream_listener(
        cache: Arc<RuleCache>,
        reload_strategy: Arc<dyn ReloadStrategy>,
        downstream: Arc<dyn ReloadListener>,
    ) -> Self {
        Self { cache, reload_strategy, downstream: Some(downstream) }
    }

    /// Starts the reload strategy with this provider as its listener.
    /// Idempotent per the `ReloadStrategy` contract.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.reload_strategy.start(self.clone()).await
    }

    pub async fn stop(&self) {
        self.reload_strategy.stop().await;
    }

    pub async fn get(&self, rule_set_id: &str) -> Result<Option<Arc<RuleSet>>> {
        self.cache.get(rule_set_id).await
    }
}

#[async_trait]
impl ReloadListener for CachingProvider {
    async fn on_rule_changed(&self, rule_set_id: Option<String>) {
        self.cache.invalidate(rule_set_id.as_deref()).await;
        if let Some(downstream) = &self.downstream {
            downstream.on_rule_changed(rule_set_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Band, OnLimitExceedPolicy, Rule, Scope};
    use crate::reload::NoneReloadStrategy;
    use crate::rule_store::InMemoryRuleStore;
    use std::collections::HashMap;
    use std::time::Duration;

    fn rule_set(id: &str) -> RuleSet {
        RuleSet {
            id: id.to_string(),
            description: None,
            rules: vec![Rule {
                id: "r1".to_string(),
                name: "r1".to_string(),
                enabled: true,
                scope: Scope::Global,
                key_strategy_id: "global".to_string(),
                on_limit_exceed_policy: OnLimitExceedPolicy::Reject,
                bands: vec![Band::new(Duration::from_secs(1), 1)],
                rule_set_id: Some(id.to_string()),
                priority: None,
                attributes: HashMap::new(),
            }],
        }
    }

    #[tokio::test]
    async fn on_rule_changed_invalidates_cache() {
        let store = Arc::new(InMemoryRuleStore::new());
        store.save(rule_set("rs1")).await.unwrap();
        let cache = Arc::new(RuleCache::new(store.clone(), 100, Duration::from_secs(60), Duration::from_secs(5)));
        let provider = Arc::new(CachingProvider::new(cache.clone(), Arc::new(NoneReloadStrategy)));

        assert!(provider.get("rs1").await.unwrap().is_some());

        store.delete_by_id("rs1").await.unwrap();
        // cache still holds the stale hit until told otherwise
        assert!(provider.get("rs1").await.unwrap().is_some());

        provider.on_rule_changed(Some("rs1".to_string())).await;
        assert!(provider.get("rs1").await.unwrap().is_none());
    }
}
