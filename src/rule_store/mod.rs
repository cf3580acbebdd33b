//! # Rule Store
//!
//! Durable storage for `RuleSet`s. A bespoke MongoDB↔domain document
//! mapping layer is out of scope; the trait contract here is the
//! thin collaborator surface the Caching Provider actually needs, in the
//! same spirit `psenger_throttler::rate_limit_config::RateLimitConfig`
//! keeps its rule storage decoupled from how the rules were loaded.

mod in_memory;
mod mongo;

pub use in_memory::InMemoryRuleStore;
pub use mongo::MongoRuleStore;

use crate::error::Result;
use crate::model::RuleSet;
use async_trait::async_trait;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Loads one rule set by id. `Ok(None)` means "not found" — callers
    /// decide what that means via the configured missing-rule-set policy,
    /// the store never does.
    async fn find_by_id(&self, rule_set_id: &str) -> Result<Option<RuleSet>>;

    /// Loads every rule set, for bulk warm-up or administrative listing.
    async fn find_all(&self) -> Result<Vec<RuleSet>>;

    /// Inserts or fully replaces a rule set.
    async fn save(&self, rule_set: RuleSet) -> Result<()>;

    /// Removes a rule set. Idempotent: absent ids are not an error.
    async fn delete_by_id(&self, rule_set_id: &str) -> Result<()>;
}
