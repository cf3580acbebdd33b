//! Validates a loaded `Config` before it's used to build the `Engine`, so a
//! bad value is a startup-time `ConfigError` rather than a runtime surprise.
//! Keeps the teacher's per-field validation style
//! (`ConfigValidator::validate_*`) but adds a single `validate` entry point
//! that checks the whole tree at once.

use crate::config::Config;
use crate::error::FluxGateError;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<(), FluxGateError> {
        Self::validate_redis_url(&config.redis_url)?;
        Self::validate_bind_address(&config.bind_address)?;

        if config.cache.max_size == 0 {
            return Err(FluxGateError::ConfigError("cache.max_size must be greater than 0".to_string()));
        }
        if config.cache.ttl_seconds == 0 {
            return Err(FluxGateError::ConfigError("cache.ttl_seconds must be greater than 0".to_string()));
        }

        if config.reload.polling_interval_seconds == 0 {
            return Err(FluxGateError::ConfigError(
                "reload.polling_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if config.reload.pubsub_channel.trim().is_empty() {
            return Err(FluxGateError::ConfigError("reload.pubsub_channel cannot be empty".to_string()));
        }

        if config.retry.enabled {
            if config.retry.max_attempts == 0 {
                return Err(FluxGateError::ConfigError("retry.max_attempts must be greater than 0".to_string()));
            }
            if config.retry.multiplier <= 1.0 {
                return Err(FluxGateError::ConfigError("retry.multiplier must be greater than 1.0".to_string()));
            }
        }

        if config.circuit_breaker.enabled {
            if config.circuit_breaker.failure_threshold == 0 {
                return Err(FluxGateError::ConfigError(
                    "circuit_breaker.failure_threshold must be greater than 0".to_string(),
                ));
            }
            if config.circuit_breaker.permitted_in_half_open == 0 {
                return Err(FluxGateError::ConfigError(
                    "circuit_breaker.permitted_in_half_open must be greater than 0".to_string(),
                ));
            }
        }

        if config.wait_for_refill.enabled && config.wait_for_refill.max_wait_millis == 0 {
            return Err(FluxGateError::ConfigError(
                "wait_for_refill.max_wait_millis must be greater than 0 when enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_redis_url(url: &str) -> Result<(), FluxGateError> {
        if url.is_empty() {
            return Err(FluxGateError::ConfigError("redis_url cannot be empty".to_string()));
        }
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(FluxGateError::ConfigError(
                "redis_url must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_bind_address(address: &str) -> Result<(), FluxGateError> {
        if address.is_empty() {
            return Err(FluxGateError::ConfigError("bind_address cannot be empty".to_string()));
        }
        if !address.contains(':') {
            return Err(FluxGateError::ConfigError("bind_address must be in host:port format".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_bad_redis_url() {
        let mut config = Config::default();
        config.redis_url = "http://localhost:6379".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_cache_size() {
        let mut config = Config::default();
        config.cache.max_size = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn rejects_retry_multiplier_of_one() {
        let mut config = Config::default();
        config.retry.multiplier = 1.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn disabled_wait_for_refill_skips_its_own_validation() {
        let mut config = Config::default();
        config.wait_for_refill.enabled = false;
        config.wait_for_refill.max_wait_millis = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
