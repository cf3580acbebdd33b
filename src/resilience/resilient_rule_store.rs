//! Decorates any `RuleStore` with retry and circuit-breaking, the same way
//! `ResilientBucketStore` guards the bucket store's network path — the
//! Mongo round-trip behind `RuleCache` is the other piece of I/O on the
//! request path and needs the same protection.

use super::{CircuitBreaker, Retrier};
use crate::error::Result;
use crate::model::RuleSet;
use crate::rule_store::RuleStore;
use async_trait::async_trait;
use std::sync::Arc;

const RESOURCE_NAME: &str = "rule_store";

pub struct ResilientRuleStore {
    inner: Arc<dyn RuleStore>,
    retrier: Retrier,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl ResilientRuleStore {
    pub fn new(inner: Arc<dyn RuleStore>, retrier: Retrier, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, retrier, circuit_breaker }
    }
}

#[async_trait]
impl RuleStore for ResilientRuleStore {
    async fn find_by_id(&self, rule_set_id: &str) -> Result<Option<RuleSet>> {
        let inner = self.inner.clone();
        self.circuit_breaker
            .call(RESOURCE_NAME, || {
                let inner = inner.clone();
                let retrier = &self.retrier;
                async move {
                    retrier
                        .call(|| {
                            let inner = inner.clone();
                            async move { inner.find_by_id(rule_set_id).await }
                        })
                        .await
                }
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<RuleSet>> {
        // bulk admin listing, not the request path: the same reasoning
        // `ResilientBucketStore::compensate` uses to talk to the inner
        // store directly applies here too.
        self.inner.find_all().await
    }

    async fn save(&self, rule_set: RuleSet) -> Result<()> {
        self.inner.save(rule_set).await
    }

    async fn delete_by_id(&self, rule_set_id: &str) -> Result<()> {
        self.inner.delete_by_id(rule_set_id).await
    }
}
