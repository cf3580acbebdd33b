//! JSON response shapes for the demo HTTP binding. Kept as a thin
//! translation layer between `RateLimitResult`/`HealthStatus` and the
//! wire format, the same separation the teacher draws between its engine
//! types and `response.rs`.

use crate::model::RateLimitResult;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_time_millis: u64,
    pub retry_after_seconds: Option<u64>,
    pub matched_rule: Option<String>,
}

impl From<&RateLimitResult> for RateLimitResponse {
    fn from(result: &RateLimitResult) -> Self {
        Self {
            allowed: result.allowed,
            remaining: result.remaining_tokens,
            reset_time_millis: result.reset_time_millis,
            retry_after_seconds: if result.allowed { None } else { Some(result.retry_after_seconds()) },
            matched_rule: result.matched_rule.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_result_has_no_retry_after() {
        let result = RateLimitResult::allowed_without_rule();
        let response = RateLimitResponse::from(&result);
        assert!(response.allowed);
        assert!(response.retry_after_seconds.is_none());
    }

    #[test]
    fn rejected_result_carries_retry_after() {
        let mut result = RateLimitResult::allowed_without_rule();
        result.allowed = false;
        result.nanos_to_wait = 5_000_000_000;
        let response = RateLimitResponse::from(&result);
        assert!(!response.allowed);
        assert_eq!(response.retry_after_seconds, Some(5));
    }
}
