//! # Engine façade
//!
//! The single entry point external callers use: `check` resolves a rule set
//! through the Caching Provider and hands its rules, in priority order, to
//! the Rate Limiter, which enforces every enabled rule's bands as one
//! conjunction (all matched rules, all bands, must allow). Plays the
//! same "one orchestrator in front of several collaborators" role the
//! teacher's `Throttler` does, generalized from one hardcoded rule per key
//! to rule sets with multiple ordered, multi-band rules.
//!
//! `check` never lets a Rule Store or Bucket Store outage escape as a raw
//! error on its own: by default it converts one into an allow-without-rule
//! result (fail-open), since the request path should stay available even
//! when the shared infrastructure behind it is not. See `fail_open` below.

use crate::caching_provider::CachingProvider;
use crate::error::{FluxGateError, Result};
use crate::model::{OnMissingRuleSetPolicy, RateLimitResult, RequestContext};
use crate::rate_limiter::RateLimiter;
use std::sync::Arc;
use tracing::warn;

pub struct Engine {
    caching_provider: Arc<CachingProvider>,
    rate_limiter: RateLimiter,
    on_missing_rule_set: OnMissingRuleSetPolicy,
    fail_open: bool,
}

impl Engine {
    /// `fail_open` governs what happens when the Rule Store or Bucket
    /// Store is unreachable mid-check (§5): `true` (the production
    /// default) converts a `StoreTransient`/`CircuitOpen` failure into
    /// [`RateLimitResult::allowed_without_rule`] rather than letting it
    /// reach the caller as an error; `false` propagates it, for
    /// deployments that would rather fail closed at the caller boundary.
    pub fn new(
        caching_provider: Arc<CachingProvider>,
        rate_limiter: RateLimiter,
        on_missing_rule_set: OnMissingRuleSetPolicy,
        fail_open: bool,
    ) -> Self {
        Self { caching_provider, rate_limiter, on_missing_rule_set, fail_open }
    }

    /// Starts the underlying reload strategy. Call once after construction.
    pub async fn start(&self) -> Result<()> {
        self.caching_provider.start().await
    }

    pub async fn stop(&self) {
        self.caching_provider.stop().await;
    }

    /// Evaluates `rule_set_id` against `context`, consuming `permits`
    /// tokens from every enabled rule's bands that applies to this request.
    pub async fn check(
        &self,
        rule_set_id: &str,
        context: &RequestContext,
        permits: u64,
    ) -> Result<RateLimitResult> {
        let rule_set = match self.caching_provider.get(rule_set_id).await {
            Ok(Some(rule_set)) => rule_set,
            Ok(None) => {
                return match self.on_missing_rule_set {
                    OnMissingRuleSetPolicy::Throw => {
                        Err(FluxGateError::RuleSetMissing(rule_set_id.to_string()))
                    }
                    OnMissingRuleSetPolicy::Allow => {
                        warn!(rule_set_id, "rule set missing, allowing per configured policy");
                        Ok(RateLimitResult::allowed_without_rule())
                    }
                };
            }
            Err(err) => return self.handle_infra_failure(rule_set_id, err),
        };

        let ordered = rule_set.ordered_rules();
        match self.rate_limiter.check(rule_set_id, &ordered, context, permits).await {
            Ok(Some(result)) => Ok(result),
            // every rule in the set either is disabled or its key resolver
            // can't produce a key for this context: nothing applies.
            Ok(None) => Ok(RateLimitResult::allowed_without_rule()),
            Err(err) => self.handle_infra_failure(rule_set_id, err),
        }
    }

    /// Converts a Rule Store/Bucket Store outage into an allow-without-rule
    /// result when `fail_open` is set and the error is one an outage would
    /// actually produce; anything else (bad config, a caller mistake)
    /// always propagates, fail-open or not.
    fn handle_infra_failure(&self, rule_set_id: &str, err: FluxGateError) -> Result<RateLimitResult> {
        let is_infra_failure = matches!(err, FluxGateError::StoreTransient(_) | FluxGateError::CircuitOpen(_));
        if self.fail_open && is_infra_failure {
            warn!(rule_set_id, error = %err, "store unreachable, allowing request per fail-open policy");
            Ok(RateLimitResult::allowed_without_rule())
        } else {
            Err(err)
        }
    }
}
