//! # Metrics
//!
//! A `MetricsRecorder` trait plus an in-memory collector, generalizing the
//! teacher's per-client `MetricsCollector` from a single fixed key shape to
//! the rule-set-scoped counters this crate needs. The Engine calls it
//! best-effort — a metrics failure never affects a rate-limit decision.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    async fn record(&self, rule_set_id: &str, allowed: bool);
}

#[derive(Debug, Default, Serialize)]
pub struct RuleSetCounters {
    pub allowed: u64,
    pub rejected: u64,
}

struct AtomicCounters {
    allowed: AtomicU64,
    rejected: AtomicU64,
}

impl AtomicCounters {
    fn new() -> Self {
        Self { allowed: AtomicU64::new(0), rejected: AtomicU64::new(0) }
    }
}

pub struct MetricsCollector {
    by_rule_set: RwLock<HashMap<String, AtomicCounters>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self { by_rule_set: RwLock::new(HashMap::new()) }
    }

    pub async fn snapshot(&self) -> HashMap<String, RuleSetCounters> {
        let map = self.by_rule_set.read().await;
        map.iter()
            .map(|(id, counters)| {
                (
                    id.clone(),
                    RuleSetCounters {
                        allowed: counters.allowed.load(Ordering::Relaxed),
                        rejected: counters.rejected.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsRecorder for MetricsCollector {
    async fn record(&self, rule_set_id: &str, allowed: bool) {
        // fast path: most rule sets are seen repeatedly, so a read lock
        // covers almost every call; only a brand-new rule set needs write.
        {
            let map = self.by_rule_set.read().await;
            if let Some(counters) = map.get(rule_set_id) {
                if allowed {
                    counters.allowed.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
                return;
            }
        }

        let mut map = self.by_rule_set.write().await;
        let counters = map.entry(rule_set_id.to_string()).or_insert_with(AtomicCounters::new);
        if allowed {
            counters.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_allowed_and_rejected_separately_per_rule_set() {
        let collector = MetricsCollector::new();
        collector.record("rs1", true).await;
        collector.record("rs1", true).await;
        collector.record("rs1", false).await;
        collector.record("rs2", true).await;

        let snapshot = collector.snapshot().await;
        assert_eq!(snapshot["rs1"].allowed, 2);
        assert_eq!(snapshot["rs1"].rejected, 1);
        assert_eq!(snapshot["rs2"].allowed, 1);
        assert_eq!(snapshot["rs2"].rejected, 0);
    }
}
