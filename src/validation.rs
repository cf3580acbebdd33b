//! Input validation for the demo HTTP surface: rule set ids and permit
//! counts arrive as untrusted path/body data before reaching the Engine.
//! Keeps the teacher's `RequestValidator` — a stateless struct of
//! associated validation functions — but targets the new request shape
//! instead of the old `RateLimitConfig` CRUD payloads.

use crate::error::FluxGateError;
use regex::Regex;
use std::sync::LazyLock;

static RULE_SET_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:-]{1,200}$").expect("valid regex"));

pub struct RequestValidator;

impl RequestValidator {
    pub fn new() -> Self {
        Self
    }

    /// Rule set ids are used as cache keys, Rule Store lookup keys, and
    /// bucket-key prefixes, so they're restricted to a conservative
    /// character set rather than accepting arbitrary path segments.
    pub fn validate_rule_set_id(id: &str) -> Result<(), FluxGateError> {
        if id.trim().is_empty() {
            return Err(FluxGateError::ValidationError("rule set id cannot be empty".to_string()));
        }
        if !RULE_SET_ID_PATTERN.is_match(id) {
            return Err(FluxGateError::ValidationError(format!(
                "rule set id '{id}' contains characters outside [A-Za-z0-9_.:-] or exceeds 200 characters"
            )));
        }
        Ok(())
    }

    /// Permits must be at least 1 — "check but consume nothing" isn't a
    /// request this API models; callers that want a read-only peek should
    /// poll status out of band, not send `permits: 0`.
    pub fn validate_permits(permits: u64) -> Result<(), FluxGateError> {
        if permits == 0 {
            return Err(FluxGateError::ValidationError("permits must be at least 1".to_string()));
        }
        if permits > 1_000_000 {
            return Err(FluxGateError::ValidationError("permits exceeds the maximum of 1,000,000".to_string()));
        }
        Ok(())
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new()
    }
}
