//! # Rate Limiter
//!
//! Evaluates a rule set's enabled rules against a `RequestContext`: resolves
//! each matched rule's subject key, consumes from every band of every
//! matched rule in order, and compensates already-granted bands across the
//! whole rule set if any later band rejects — every band of every matched
//! rule must allow for the rule set to allow (§4.4's "all matched rules, all
//! bands, one conjunction"). Keeps the teacher's shape — one engine type
//! wrapping a bucket store behind a small, synchronous-looking API — but the
//! storage layer is now the `BucketStore` trait instead of a hardcoded
//! local/Redis split, and the token-bucket math lives in `bucket_store`
//! rather than here.

use crate::bucket_store::BucketStore;
use crate::error::Result;
use crate::key_resolver::KeyResolverRegistry;
use crate::model::{ConsumeOutcome, RateLimitResult, RequestContext, Rule};
use std::sync::Arc;
use tracing::warn;

pub struct RateLimiter {
    pub(crate) bucket_store: Arc<dyn BucketStore>,
    key_resolvers: Arc<KeyResolverRegistry>,
}

impl RateLimiter {
    pub fn new(bucket_store: Arc<dyn BucketStore>, key_resolvers: Arc<KeyResolverRegistry>) -> Self {
        Self { bucket_store, key_resolvers }
    }

    /// Evaluates every enabled rule in `rules` (already in their rule set's
    /// evaluation order) against `context`. A rule whose resolver yields no
    /// key for this context is skipped — it simply does not apply. Returns
    /// `Ok(None)` when no rule applied at all, so the Engine façade can fall
    /// back to its own "allow without rule" result.
    pub async fn check(
        &self,
        rule_set_id: &str,
        rules: &[&Rule],
        context: &RequestContext,
        permits: u64,
    ) -> Result<Option<RateLimitResult>> {
        let mut granted: Vec<(String, u64)> = Vec::new();
        let mut min_remaining = u64::MAX;
        let mut max_nanos_to_wait = 0u64;
        let mut max_reset_time_millis = 0u64;
        let mut matched_rule: Option<&Rule> = None;
        let mut matched_key: Option<String> = None;
        let mut rejected = false;

        'rules: for rule in rules {
            if !rule.enabled {
                continue;
            }
            let subject_key = match self.key_resolvers.resolve(&rule.key_strategy_id, context)? {
                Some(key) => key,
                None => continue,
            };
            if matched_rule.is_none() {
                matched_rule = Some(rule);
                matched_key = Some(subject_key.to_string());
            }

            for (index, band) in rule.bands.iter().enumerate() {
                let bucket_key = format!(
                    "{rule_set_id}:{}:{}:{}",
                    rule.id,
                    subject_key.as_str(),
                    band.key_suffix(index)
                );

                let ConsumeOutcome { allowed, remaining, nanos_to_wait, reset_time_millis } = self
                    .bucket_store
                    .consume(&bucket_key, band.capacity, band.window_nanos(), permits)
                    .await?;

                if allowed {
                    granted.push((bucket_key, permits));
                    min_remaining = min_remaining.min(remaining);
                    max_reset_time_millis = max_reset_time_millis.max(reset_time_millis);
                } else {
                    rejected = true;
                    max_nanos_to_wait = max_nanos_to_wait.max(nanos_to_wait);
                    max_reset_time_millis = max_reset_time_millis.max(reset_time_millis);
                    break 'rules;
                }
            }
        }

        let Some(matched_rule) = matched_rule else {
            // no enabled rule resolved a subject for this request
            return Ok(None);
        };

        if rejected {
            self.compensate_all(&granted).await;
            return Ok(Some(RateLimitResult {
                allowed: false,
                remaining_tokens: 0,
                nanos_to_wait: max_nanos_to_wait,
                reset_time_millis: max_reset_time_millis,
                matched_rule: Some(matched_rule.id.clone()),
                key: matched_key,
                on_limit_exceed_policy: Some(matched_rule.on_limit_exceed_policy),
            }));
        }

        Ok(Some(RateLimitResult {
            allowed: true,
            remaining_tokens: if min_remaining == u64::MAX { 0 } else { min_remaining },
            nanos_to_wait: 0,
            reset_time_millis: max_reset_time_millis,
            matched_rule: Some(matched_rule.id.clone()),
            key: matched_key,
            on_limit_exceed_policy: Some(matched_rule.on_limit_exceed_policy),
        }))
    }

    /// Refunds every band already granted before the rejecting one.
    /// Compensation failures are logged and swallowed: the caller already
    /// has its rejection decision, and an over-counted bucket self-corrects
    /// on its next natural refill.
    async fn compensate_all(&self, granted: &[(String, u64)]) {
        for (bucket_key, permits) in granted {
            if let Err(err) = self.bucket_store.compensate(bucket_key, *permits).await {
                warn!(bucket = %bucket_key, error = %err, "band compensation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket_store::InProcessBucketStore;
    use crate::model::{Band, OnLimitExceedPolicy, Scope};
    use std::collections::HashMap;
    use std::time::Duration;

    fn rule_with_bands(bands: Vec<Band>) -> Rule {
        Rule {
            id: "r1".to_string(),
            name: "r1".to_string(),
            enabled: true,
            scope: Scope::PerIp,
            key_strategy_id: "per-ip".to_string(),
            on_limit_exceed_policy: OnLimitExceedPolicy::Reject,
            bands,
            rule_set_id: Some("rs1".to_string()),
            priority: None,
            attributes: HashMap::new(),
        }
    }

    fn context() -> RequestContext {
        RequestContext::builder().client_ip("10.0.0.1").build()
    }

    #[tokio::test]
    async fn disabled_rule_never_applies() {
        let limiter = RateLimiter::new(
            Arc::new(InProcessBucketStore::new()),
            Arc::new(KeyResolverRegistry::with_defaults()),
        );
        let mut rule = rule_with_bands(vec![Band::new(Duration::from_secs(60), 1)]);
        rule.enabled = false;
        let result = limiter.check("rs1", &[&rule], &context(), 1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn rule_without_resolvable_key_does_not_apply() {
        let limiter = RateLimiter::new(
            Arc::new(InProcessBucketStore::new()),
            Arc::new(KeyResolverRegistry::with_defaults()),
        );
        let rule = rule_with_bands(vec![Band::new(Duration::from_secs(60), 1)]);
        let result = limiter.check("rs1", &[&rule], &RequestContext::default(), 1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn all_bands_must_allow() {
        let limiter = RateLimiter::new(
            Arc::new(InProcessBucketStore::new()),
            Arc::new(KeyResolverRegistry::with_defaults()),
        );
        let rule = rule_with_bands(vec![
            Band::new(Duration::from_secs(60), 100).with_label("minute"),
            Band::new(Duration::from_secs(1), 1).with_label("second"),
        ]);

        let first = limiter.check("rs1", &[&rule], &context(), 1).await.unwrap().unwrap();
        assert!(first.allowed);

        // the per-second band is now exhausted; the per-minute band would
        // still allow, but the rule overall must reject
        let second = limiter.check("rs1", &[&rule], &context(), 1).await.unwrap().unwrap();
        assert!(!second.allowed);
    }

    #[tokio::test]
    async fn rejected_band_compensates_earlier_grants() {
        let limiter = RateLimiter::new(
            Arc::new(InProcessBucketStore::new()),
            Arc::new(KeyResolverRegistry::with_defaults()),
        );
        let rule = rule_with_bands(vec![
            Band::new(Duration::from_secs(60), 5).with_label("minute"),
            Band::new(Duration::from_secs(1), 1).with_label("second"),
        ]);

        // exhaust the second-band first so the next check rejects on it
        // after having already granted the minute band
        let ctx = context();
        limiter.check("rs1", &[&rule], &ctx, 1).await.unwrap();

        let result = limiter.check("rs1", &[&rule], &ctx, 1).await.unwrap().unwrap();
        assert!(!result.allowed);

        // first check consumed 1 from the minute band (5->4); the second
        // check's minute-band grant (4->3) must have been refunded by
        // compensation back to 4, since that check overall rejected
        for _ in 0..4 {
            let outcome = limiter
                .bucket_store
                .consume("rs1:r1:10.0.0.1:minute", 5, Duration::from_secs(60).as_nanos() as u64, 1)
                .await
                .unwrap();
            if !outcome.allowed {
                panic!("expected minute band to have been compensated back to capacity");
            }
        }
    }

    #[tokio::test]
    async fn multiple_enabled_rules_are_all_enforced() {
        let limiter = RateLimiter::new(
            Arc::new(InProcessBucketStore::new()),
            Arc::new(KeyResolverRegistry::with_defaults()),
        );
        // a per-ip rule with plenty of headroom alongside a near-exhausted
        // global rule in the same rule set: both are enabled, so both must
        // allow for the overall check to allow.
        let per_ip = rule_with_bands(vec![Band::new(Duration::from_secs(60), 100)]);
        let mut global = rule_with_bands(vec![Band::new(Duration::from_secs(60), 1)]);
        global.id = "r2".to_string();
        global.scope = Scope::Global;
        global.key_strategy_id = "global".to_string();

        let ctx = context();
        let first = limiter.check("rs1", &[&per_ip, &global], &ctx, 1).await.unwrap().unwrap();
        assert!(first.allowed);
        // the first matching rule in order reports as matched
        assert_eq!(first.matched_rule.as_deref(), Some("r1"));

        // the global rule's single-token bucket is now exhausted, so even
        // though the per-ip rule still has headroom, the overall check must
        // reject and the per-ip grant must be compensated back.
        let second = limiter.check("rs1", &[&per_ip, &global], &ctx, 1).await.unwrap().unwrap();
        assert!(!second.allowed);

        let outcome = limiter
            .bucket_store
            .consume("rs1:r1:10.0.0.1:0", 100, Duration::from_secs(60).as_nanos() as u64, 1)
            .await
            .unwrap();
        assert!(outcome.allowed, "per-ip band should have been compensated after the global rule rejected");
    }
}
