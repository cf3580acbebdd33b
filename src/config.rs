//! # Configuration
//!
//! Covers every configurable subsystem: store connections, cache sizing,
//! reload strategy, retry, circuit breaker, and wait-for-refill. Loads the
//! same way the teacher's `Config::load` does — `config::Config::builder`
//! layering an optional file over environment variables — but under the
//! `FLUXGATE_` prefix and with real variants instead of silently falling
//! back to `Config::default()` on a bad value (that fallback hid
//! misconfiguration; this crate treats it as a startup-time `ConfigError`).

use crate::error::{FluxGateError, Result};
use crate::resilience::FallbackStrategy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub redis_url: String,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub mongo_collection: String,
    pub on_missing_rule_set: MissingRuleSetSetting,
    pub cache: CacheConfig,
    pub reload: ReloadConfig,
    pub retry: RetryConfigSetting,
    pub circuit_breaker: CircuitBreakerConfig,
    pub wait_for_refill: WaitForRefillConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingRuleSetSetting {
    Throw,
    Allow,
}

impl From<MissingRuleSetSetting> for crate::model::OnMissingRuleSetPolicy {
    fn from(value: MissingRuleSetSetting) -> Self {
        match value {
            MissingRuleSetSetting::Throw => crate::model::OnMissingRuleSetPolicy::Throw,
            MissingRuleSetSetting::Allow => crate::model::OnMissingRuleSetPolicy::Allow,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub negative_ttl_seconds: u64,
    pub max_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300, negative_ttl_seconds: 30, max_size: 10_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadStrategySetting {
    None,
    Polling,
    Pubsub,
    /// Picks `Pubsub` if the shared store is reachable at startup, else
    /// falls back to `Polling`. Resolved once, in `server::create_app`,
    /// before any `ReloadStrategy` is constructed.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub strategy: ReloadStrategySetting,
    pub polling_interval_seconds: u64,
    pub initial_delay_seconds: u64,
    pub pubsub_channel: String,
    pub pubsub_max_reconnect_attempts: u32,
    pub reset_buckets_on_change: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            strategy: ReloadStrategySetting::None,
            polling_interval_seconds: 30,
            initial_delay_seconds: 5,
            pubsub_channel: "fluxgate:rule-changes".to_string(),
            pubsub_max_reconnect_attempts: 10,
            reset_buckets_on_change: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigSetting {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff_millis: u64,
    pub multiplier: f64,
    pub max_backoff_millis: u64,
}

impl Default for RetryConfigSetting {
    fn default() -> Self {
        Self { enabled: true, max_attempts: 3, initial_backoff_millis: 50, multiplier: 2.0, max_backoff_millis: 2_000 }
    }
}

impl From<&RetryConfigSetting> for crate::resilience::RetryConfig {
    fn from(value: &RetryConfigSetting) -> Self {
        crate::resilience::RetryConfig {
            enabled: value.enabled,
            max_attempts: value.max_attempts,
            initial_backoff: std::time::Duration::from_millis(value.initial_backoff_millis),
            multiplier: value.multiplier,
            max_backoff: std::time::Duration::from_millis(value.max_backoff_millis),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategySetting {
    FailOpen,
    FailClosed,
}

impl From<FallbackStrategySetting> for FallbackStrategy {
    fn from(value: FallbackStrategySetting) -> Self {
        match value {
            FallbackStrategySetting::FailOpen => FallbackStrategy::FailOpen,
            FallbackStrategySetting::FailClosed => FallbackStrategy::FailClosed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub wait_in_open_seconds: u64,
    pub permitted_in_half_open: u32,
    pub fallback: FallbackStrategySetting,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            wait_in_open_seconds: 30,
            permitted_in_half_open: 1,
            fallback: FallbackStrategySetting::FailClosed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitForRefillConfig {
    pub enabled: bool,
    pub max_wait_millis: u64,
    pub max_concurrent_waits: u32,
}

impl Default for WaitForRefillConfig {
    fn default() -> Self {
        Self { enabled: false, max_wait_millis: 1_000, max_concurrent_waits: 1_000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "fluxgate".to_string(),
            mongo_collection: "rule_sets".to_string(),
            on_missing_rule_set: MissingRuleSetSetting::Throw,
            cache: CacheConfig::default(),
            reload: ReloadConfig::default(),
            retry: RetryConfigSetting::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            wait_for_refill: WaitForRefillConfig::default(),
        }
    }
}

impl Config {
    /// Loads config from, in order: built-in defaults, an optional file at
    /// `path`, then `FLUXGATE_*` environment variables — the same
    /// precedence `psenger_throttler::config::Config::load` uses, just
    /// under this crate's own prefix and without the silent fallback the
    /// teacher's version had on a malformed value.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("FLUXGATE").separator("__"))
            .build()
            .map_err(|e| FluxGateError::ConfigError(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| FluxGateError::ConfigError(format!("failed to parse configuration: {e}")))?;

        crate::config_validator::ConfigValidator::validate(&config)?;
        Ok(config)
    }
}
