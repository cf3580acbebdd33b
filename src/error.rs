//! # Error Types and Handling
//!
//! Mirrors `psenger_throttler::error::ThrottlerError`'s shape — one enum,
//! one `IntoResponse` impl, automatic `From` conversions for storage
//! errors — but adds the error kinds a distributed rate limiter needs
//! (invalid argument, store-transient, store-fatal, rule-set-missing,
//! circuit-open) and a `Retryable` classification the resilience wrapper
//! needs.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FluxGateError {
    /// Non-positive capacity/window/permits, missing required context.
    /// Fatal: never retried, surfaced to the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection refused, timeout, cluster-not-ready. Retryable.
    #[error("store unavailable: {0}")]
    StoreTransient(String),

    /// Authentication, schema mismatch. Non-retryable, trips the breaker.
    #[error("store error: {0}")]
    StoreFatal(String),

    /// The requested rule set id is absent. Handled per `onMissingRuleSet`.
    #[error("rule set not found: {0}")]
    RuleSetMissing(String),

    /// A named circuit breaker is open and `fallbackStrategy` is `fail-closed`.
    #[error("circuit open for resource '{0}'")]
    CircuitOpen(String),

    /// `keyStrategyId` does not name a resolver registered at construction
    /// time. Fatal only at the first `check` that needs it.
    #[error("unknown key strategy: {0}")]
    UnknownKeyStrategy(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl FluxGateError {
    /// Classifies whether the resilience wrapper's retry loop should retry
    /// this error. Schema/validation/permission errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FluxGateError::StoreTransient(_))
    }

    /// Whether this error should count as a failure for circuit-breaker
    /// bookkeeping. Invalid-argument and validation errors are
    /// caller mistakes, not infrastructure health signals.
    pub fn trips_breaker(&self) -> bool {
        matches!(self, FluxGateError::StoreTransient(_) | FluxGateError::StoreFatal(_))
    }
}

impl From<redis::RedisError> for FluxGateError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
            FluxGateError::StoreTransient(err.to_string())
        } else {
            FluxGateError::StoreFatal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FluxGateError {
    fn from(err: serde_json::Error) -> Self {
        FluxGateError::SerializationError(err.to_string())
    }
}

impl From<mongodb::error::Error> for FluxGateError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;
        match *err.kind {
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
                FluxGateError::StoreTransient(err.to_string())
            }
            _ => FluxGateError::StoreFatal(err.to_string()),
        }
    }
}

impl IntoResponse for FluxGateError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            FluxGateError::ValidationError(_) | FluxGateError::InvalidArgument(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "validation_error", "message": self.to_string() }),
            ),
            FluxGateError::ConfigError(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "configuration_error", "message": self.to_string() }),
            ),
            FluxGateError::RuleSetMissing(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": "rule_set_missing", "message": self.to_string() }),
            ),
            FluxGateError::CircuitOpen(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": "circuit_open", "message": self.to_string() }),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "internal_error", "message": "An unexpected error occurred" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, FluxGateError>;
