//! # Rule Cache
//!
//! Bounded, TTL-based cache in front of the `RuleStore`. Uses
//! `moka`'s async cache for its `get_with` coalescing guarantee: concurrent
//! misses on the same key collapse into a single upstream load, a
//! single-flight property the teacher's simple `HashMap` buckets never
//! needed to provide.

use crate::error::{FluxGateError, Result};
use crate::model::RuleSet;
use crate::rule_store::RuleStore;
use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cached lookup outcome: either a rule set, or a remembered "this id does
/// not exist" marker (negative caching) with its own shorter TTL so a
/// since-created rule set is picked up sooner than a healthy hit.
#[derive(Clone)]
enum CacheEntry {
    Present(Arc<RuleSet>),
    Absent,
}

/// Gives `Absent` entries a shorter lifetime than `Present` ones, so a
/// negative cache result expires faster than a healthy hit.
struct RuleCacheExpiry {
    ttl: Duration,
    negative_ttl: Duration,
}

impl Expiry<String, CacheEntry> for RuleCacheExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _now: Instant) -> Option<Duration> {
        match value {
            CacheEntry::Present(_) => Some(self.ttl),
            CacheEntry::Absent => Some(self.negative_ttl),
        }
    }
}

pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    cache: Cache<String, CacheEntry>,
}

impl RuleCache {
    pub fn new(store: Arc<dyn RuleStore>, max_size: u64, ttl: Duration, negative_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_size)
            .expire_after(RuleCacheExpiry { ttl, negative_ttl })
            .build();
        Self { store, cache }
    }

    /// Returns the rule set for `rule_set_id`, loading from the store on a
    /// miss. Concurrent callers racing the same miss share one store load.
    pub async fn get(&self, rule_set_id: &str) -> Result<Option<Arc<RuleSet>>> {
        if let Some(cached) = self.cache.get(rule_set_id).await {
            return Ok(self.unwrap_entry(cached));
        }

        let store = self.store.clone();
        let id = rule_set_id.to_string();
        let entry = self
            .cache
            .try_get_with(rule_set_id.to_string(), async move {
                match store.find_by_id(&id).await? {
                    Some(rule_set) => Ok::<CacheEntry, FluxGateError>(CacheEntry::Present(Arc::new(rule_set))),
                    None => Ok(CacheEntry::Absent),
                }
            })
            .await
            .map_err(|shared| (*shared).clone())?;

        Ok(self.unwrap_entry(entry))
    }

    /// Drops the cached entry for `rule_set_id`, or every entry when
    /// `rule_set_id` is `None` (the reload listener contract).
    pub async fn invalidate(&self, rule_set_id: Option<&str>) {
        match rule_set_id {
            Some(id) => self.cache.invalidate(id).await,
            None => self.cache.invalidate_all(),
        }
    }

    fn unwrap_entry(&self, entry: CacheEntry) -> Option<Arc<RuleSet>> {
        match entry {
            CacheEntry::Present(rule_set) => Some(rule_set),
            CacheEntry::Absent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Band, OnLimitExceedPolicy, Rule, Scope};
    use crate::rule_store::InMemoryRuleStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingStore {
        inner: InMemoryRuleStore,
        loads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RuleStore for CountingStore {
        async fn find_by_id(&self, rule_set_id: &str) -> Result<Option<RuleSet>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(rule_set_id).await
        }
        async fn find_all(&self) -> Result<Vec<RuleSet>> {
            self.inner.find_all().await
        }
        async fn save(&self, rule_set: RuleSet) -> Result<()> {
            self.inner.save(rule_set).await
        }
        async fn delete_by_id(&self, rule_set_id: &str) -> Result<()> {
            self.inner.delete_by_id(rule_set_id).await
        }
    }

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
                bands: vec![Band::new(StdDuration::from_secs(1), 1)],
                rule_set_id: Some(id.to_string()),
                priority: None,
                attributes: HashMap::new(),
            }],
        }
    }

    #[tokio::test]
    async fn repeated_hits_do_not_reload_from_store() {
        let inner = InMemoryRuleStore::new();
        inner.save(rule_set("rs1")).await.unwrap();
        let store = Arc::new(CountingStore { inner, loads: AtomicUsize::new(0) });
        let cache = RuleCache::new(store.clone(), 100, Duration::from_secs(60), Duration::from_secs(5));

        cache.get("rs1").await.unwrap();
        cache.get("rs1").await.unwrap();
        cache.get("rs1").await.unwrap();

        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_load() {
        let inner = InMemoryRuleStore::new();
        inner.save(rule_set("rs1")).await.unwrap();
        let store = Arc::new(CountingStore { inner, loads: AtomicUsize::new(0) });
        let cache = Arc::new(RuleCache::new(store.clone(), 100, Duration::from_secs(60), Duration::from_secs(5)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("rs1").await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_rule_set_is_cached_as_absent() {
        let inner = InMemoryRuleStore::new();
        let store = Arc::new(CountingStore { inner, loads: AtomicUsize::new(0) });
        let cache = RuleCache::new(store.clone(), 100, Duration::from_secs(60), Duration::from_secs(5));

        assert!(cache.get("missing").await.unwrap().is_none());
        assert!(cache.get("missing").await.unwrap().is_none());
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let inner = InMemoryRuleStore::new();
        inner.save(rule_set("rs1")).await.unwrap();
        let store = Arc::new(CountingStore { inner, loads: AtomicUsize::new(0) });
        let cache = RuleCache::new(store.clone(), 100, Duration::from_secs(60), Duration::from_secs(5));

        cache.get("rs1").await.unwrap();
        cache.invalidate(Some("rs1")).await;
        cache.get("rs1").await.unwrap();

        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }
}
