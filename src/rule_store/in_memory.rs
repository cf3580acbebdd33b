//! In-memory `RuleStore` for tests and single-process deployments that
//! embed their rule sets as static configuration rather than a database.

use super::RuleStore;
use crate::error::Result;
use crate::model::RuleSet;
use async_trait::async_trait;
use std::sync::RwLock;
use std::collections::HashMap;

pub struct InMemoryRuleStore {
    rule_sets: RwLock<HashMap<String, RuleSet>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self { rule_sets: RwLock::new(HashMap::new()) }
    }

    pub fn seeded(rule_sets: impl IntoIterator<Item = RuleSet>) -> Self {
        let map = rule_sets.into_iter().map(|rs| (rs.id.clone(), rs)).collect();
        Self { rule_sets: RwLock::new(map) }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find_by_id(&self, rule_set_id: &str) -> Result<Option<RuleSet>> {
        Ok(self.rule_sets.read().unwrap().get(rule_set_id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<RuleSet>> {
        Ok(self.rule_sets.read().unwrap().values().cloned().collect())
    }

    async fn save(&self, rule_set: RuleSet) -> Result<()> {
        self.rule_sets.write().unwrap().insert(rule_set.id.clone(), rule_set);
        Ok(())
    }

    async fn delete_by_id(&self, rule_set_id: &str) -> Result<()> {
        self.rule_sets.write().unwrap().remove(rule_set_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Band, OnLimitExceedPolicy, Rule, Scope};
    use std::collections::HashMap as Map;
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
                bands: vec![Band::new(Duration::from_secs(1), 10)],
                rule_set_id: Some(id.to_string()),
                priority: None,
                attributes: Map::new(),
            }],
        }
    }

    #[tokio::test]
    async fn missing_rule_set_returns_none_not_error() {
        let store = InMemoryRuleStore::new();
        assert!(store.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_find_round_trips() {
        let store = InMemoryRuleStore::new();
        store.save(rule_set("rs1")).await.unwrap();
        let found = store.find_by_id("rs1").await.unwrap();
        assert_eq!(found.unwrap().id, "rs1");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryRuleStore::new();
        store.delete_by_id("absent").await.unwrap();
        store.save(rule_set("rs1")).await.unwrap();
        store.delete_by_id("rs1").await.unwrap();
        store.delete_by_id("rs1").await.unwrap();
        assert!(store.find_by_id("rs1").await.unwrap().is_none());
    }
}
