//! # Core Data Model
//!
//! The immutable value types shared by every FluxGate subsystem: bands,
//! rules, rule sets, request contexts, bucket state and the per-check
//! result. None of these types touch I/O or time — they are pure data,
//! the same way `psenger_throttler::rate_limit_config` keeps its rule
//! shapes free of storage concerns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One `(window, capacity)` pair. A rule enforces the conjunction of its bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Refill window. Must be strictly positive.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Maximum token count the bucket can hold. Must be strictly positive.
    pub capacity: u64,
    /// Diagnostic label; also used as the bucket-key suffix when present.
    pub label: Option<String>,
}

impl Band {
    pub fn new(window: Duration, capacity: u64) -> Self {
        Self { window, capacity, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn window_nanos(&self) -> u64 {
        self.window.as_nanos().min(u128::from(u64::MAX)) as u64
    }

    /// Bucket-key suffix: the band's label if set, else its position.
    pub fn key_suffix(&self, index: usize) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => index.to_string(),
        }
    }
}

/// Which request attribute identifies the rate-limit subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Global,
    PerIp,
    PerUser,
    PerApiKey,
    Custom,
}

/// What happens to a request whose bucket rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnLimitExceedPolicy {
    Reject,
    WaitForRefill,
}

/// What the Engine façade does when `check` is asked about a rule set id
/// the Rule Cache can't resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnMissingRuleSetPolicy {
    /// Surface `RuleSetMissing` to the caller.
    Throw,
    /// Treat it as "no restriction configured": allow the request.
    Allow,
}

impl Default for OnMissingRuleSetPolicy {
    fn default() -> Self {
        Self::Throw
    }
}

/// An immutable rate-limit rule: a scope, a key-resolution strategy, a
/// policy for what to do on rejection, and an ordered, non-empty list of
/// bands that must *all* allow for the rule to allow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub scope: Scope,
    pub key_strategy_id: String,
    pub on_limit_exceed_policy: OnLimitExceedPolicy,
    pub bands: Vec<Band>,
    pub rule_set_id: Option<String>,
    /// Ordering key for `RuleStore::find_by_rule_set_id`; ties break on `id`.
    pub priority: Option<i64>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Rule {
    /// `bands` non-empty is a hard invariant — callers that violate it get a
    /// rule that can never be evaluated; construction fails fast.
    pub fn validate(&self) -> Result<(), crate::error::FluxGateError> {
        if self.bands.is_empty() {
            return Err(crate::error::FluxGateError::InvalidArgument(format!(
                "rule '{}' has no bands",
                self.id
            )));
        }
        for band in &self.bands {
            if band.capacity == 0 {
                return Err(crate::error::FluxGateError::InvalidArgument(format!(
                    "rule '{}' has a band with zero capacity",
                    self.id
                )));
            }
            if band.window.is_zero() {
                return Err(crate::error::FluxGateError::InvalidArgument(format!(
                    "rule '{}' has a band with zero-length window",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// A named collection of rules sharing one key resolver; the unit of hot reload.
///
/// `key_resolver_id` names a resolver registered with the `KeyResolverRegistry`
/// rather than carrying a function pointer directly, so rule sets stay
/// plain, serializable data loaded from the Rule Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: String,
    pub description: Option<String>,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn validate(&self) -> Result<(), crate::error::FluxGateError> {
        if self.rules.is_empty() {
            return Err(crate::error::FluxGateError::InvalidArgument(format!(
                "rule set '{}' has no rules",
                self.id
            )));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Rules in evaluation order: explicit `priority` wins, ties and absent
    /// priorities break on `id` ascending, so cache reloads are reproducible.
    pub fn ordered_rules(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by(|a, b| match (a.priority, b.priority) {
            (Some(pa), Some(pb)) => pa.cmp(&pb).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        rules
    }
}

/// Immutable snapshot of the inbound request, built once per request by the
/// external HTTP layer. FluxGate only reads it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub attributes: HashMap<String, String>,
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    inner: RequestContext,
}

impl RequestContextBuilder {
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.inner.client_ip = Some(ip.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.inner.user_id = Some(id.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.inner.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.inner.endpoint = Some(endpoint.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.inner.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.insert(name.into(), value.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.attributes.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> RequestContext {
        self.inner
    }
}

/// A rate-limit key: a single opaque string. Two keys are equal iff their
/// strings are equal; used both as a map key and as the suffix of the
/// shared-state keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RateLimitKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The per-bucket persistent record on the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: u64,
    pub last_refill_nanos: u64,
}

/// Outcome of one `BucketStore::consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub allowed: bool,
    pub remaining: u64,
    pub nanos_to_wait: u64,
    pub reset_time_millis: u64,
}

/// Per-check outcome returned by the Engine façade.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining_tokens: u64,
    pub nanos_to_wait: u64,
    pub reset_time_millis: u64,
    pub matched_rule: Option<String>,
    pub key: Option<String>,
    /// The matched rule's policy, so a caller layer can decide whether a
    /// rejection is worth a bounded wait-and-retry (§4.4's "wait-for-refill
    /// policy" is a caller-layer decision, never the core's own).
    #[serde(skip)]
    pub on_limit_exceed_policy: Option<OnLimitExceedPolicy>,
}

impl RateLimitResult {
    /// Fail-open / no-matching-rule result: allowed, no bucket consumed.
    pub fn allowed_without_rule() -> Self {
        Self {
            allowed: true,
            remaining_tokens: 0,
            nanos_to_wait: 0,
            reset_time_millis: 0,
            matched_rule: None,
            key: None,
            on_limit_exceed_policy: None,
        }
    }

    pub fn retry_after_seconds(&self) -> u64 {
        // round up: Retry-After is advisory and must not under-promise.
        (self.nanos_to_wait + 999_999_999) / 1_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_rules_sorts_by_priority_then_id() {
        let rule = |id: &str, priority: Option<i64>| Rule {
            id: id.to_string(),
            name: id.to_string(),
            enabled: true,
            scope: Scope::Global,
            key_strategy_id: "global".to_string(),
            on_limit_exceed_policy: OnLimitExceedPolicy::Reject,
            bands: vec![Band::new(Duration::from_secs(1), 1)],
            rule_set_id: None,
            priority,
            attributes: HashMap::new(),
        };

        let rs = RuleSet {
            id: "rs".to_string(),
            description: None,
            rules: vec![rule("c", None), rule("b", Some(1)), rule("a", Some(1)), rule("z", None)],
        };

        let ordered: Vec<&str> = rs.ordered_rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ordered, vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn rule_requires_at_least_one_band() {
        let rule = Rule {
            id: "r".to_string(),
            name: "r".to_string(),
            enabled: true,
            scope: Scope::Global,
            key_strategy_id: "global".to_string(),
            on_limit_exceed_policy: OnLimitExceedPolicy::Reject,
            bands: vec![],
            rule_set_id: None,
            priority: None,
            attributes: HashMap::new(),
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn retry_after_rounds_up() {
        let mut result = RateLimitResult::allowed_without_rule();
        result.nanos_to_wait = 1;
        assert_eq!(result.retry_after_seconds(), 1);
        result.nanos_to_wait = 1_000_000_000;
        assert_eq!(result.retry_after_seconds(), 1);
        result.nanos_to_wait = 1_000_000_001;
        assert_eq!(result.retry_after_seconds(), 2);
    }
}
