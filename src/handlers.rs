//! # HTTP Request Handlers
//!
//! The demo HTTP surface around the `Engine` façade: one endpoint to
//! evaluate a rule set against a request context, plus the liveness and
//! readiness probes the teacher's handlers also exposed. Mirrors the
//! teacher's handler shape (`State<SharedState>` extractor, `Result<impl
//! IntoResponse, _>` return, rate-limit headers on the response) with the
//! CRUD-style rate-limit-config endpoints replaced by the single `check`
//! call this crate's Engine actually exposes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::WaitForRefillConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::health::HealthChecker;
use crate::metrics::MetricsRecorder;
use crate::model::{OnLimitExceedPolicy, RequestContext};
use crate::response::RateLimitResponse;
use crate::validation::RequestValidator;

/// Bounds how many in-flight requests may be parked in a wait-for-refill
/// sleep at once, so a burst of rejected `wait-for-refill` rules can't pin
/// an unbounded number of tasks sleeping on the executor — this is the
/// caller-layer policy §4.4 describes, never the core's own.
pub struct WaitForRefillGate {
    config: WaitForRefillConfig,
    concurrency: Semaphore,
}

impl WaitForRefillGate {
    pub fn new(config: WaitForRefillConfig) -> Self {
        let permits = config.max_concurrent_waits.max(1) as usize;
        Self { config, concurrency: Semaphore::new(permits) }
    }
}

/// Shared application state, handed to every handler via axum's `State`
/// extractor. Everything here is already internally synchronized
/// (`Engine`'s collaborators use `Arc`/locks of their own), so handlers
/// never need to lock `AppState` itself.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: Arc<dyn MetricsRecorder>,
    pub validator: Arc<RequestValidator>,
    pub health_checker: Arc<HealthChecker>,
    pub wait_for_refill: Arc<WaitForRefillGate>,
}

/// Request body for `POST /rule-sets/:rule_set_id/check`.
///
/// `permits` defaults to 1. The subject-identifying fields are optional —
/// which ones are required depends on the scope of the rule(s) being
/// evaluated, and that's discovered at evaluation time, not parse time.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub permits: Option<u64>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl CheckRequest {
    fn into_context(self) -> RequestContext {
        let mut builder = RequestContext::builder();
        if let Some(ip) = self.client_ip {
            builder = builder.client_ip(ip);
        }
        if let Some(user_id) = self.user_id {
            builder = builder.user_id(user_id);
        }
        if let Some(api_key) = self.api_key {
            builder = builder.api_key(api_key);
        }
        if let Some(endpoint) = self.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(method) = self.method {
            builder = builder.method(method);
        }
        for (name, value) in self.attributes {
            builder = builder.attribute(name, value);
        }
        builder.build()
    }
}

/// Evaluates `rule_set_id` against the request context carried in the
/// body, consuming tokens from every enabled rule that applies.
///
/// # Response
///
/// `200 OK` with `X-RateLimit-Remaining` when allowed; `429 Too Many
/// Requests` with `Retry-After` when rejected.
pub async fn check_rate_limit(
    State(state): State<AppState>,
    Path(rule_set_id): Path<String>,
    Json(payload): Json<CheckRequest>,
) -> Result<impl IntoResponse> {
    RequestValidator::validate_rule_set_id(&rule_set_id)?;
    let permits = payload.permits.unwrap_or(1);
    RequestValidator::validate_permits(permits)?;

    let context = payload.into_context();
    let mut result = state.engine.check(&rule_set_id, &context, permits).await?;

    // §4.4 wait-for-refill policy: a caller-layer decision, not the core's.
    // A bounded sleep-then-retry-once for rules configured that way, gated
    // by a concurrency cap so a flood of rejections can't park an unbounded
    // number of requests at once.
    if !result.allowed
        && result.on_limit_exceed_policy == Some(OnLimitExceedPolicy::WaitForRefill)
        && state.wait_for_refill.config.enabled
        && result.nanos_to_wait <= state.wait_for_refill.config.max_wait_millis * 1_000_000
    {
        if let Ok(_permit) = state.wait_for_refill.concurrency.try_acquire() {
            tokio::time::sleep(Duration::from_nanos(result.nanos_to_wait)).await;
            result = state.engine.check(&rule_set_id, &context, permits).await?;
        }
    }

    state.metrics.record(&rule_set_id, result.allowed).await;

    let mut response = Json(RateLimitResponse::from(&result)).into_response();
    response
        .headers_mut()
        .insert("X-RateLimit-Remaining", result.remaining_tokens.to_string().parse().unwrap());

    if !result.allowed {
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response
            .headers_mut()
            .insert("Retry-After", result.retry_after_seconds().to_string().parse().unwrap());
    }

    Ok(response)
}

/// Liveness probe: always `200 OK` once the process is serving requests,
/// independent of bucket store health.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health_checker.check_health())
}

/// Readiness probe: `200 OK` whenever the bucket store's circuit breaker
/// is closed, `503` once it trips open or is recovering half-open — this
/// reports the breaker's own state regardless of fallback strategy, since
/// a fail-open deployment still wants its load balancer to stop sending
/// it traffic even while it's answering every request with an allow.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health_checker.check_health();
    if status.status == "healthy" {
        (StatusCode::OK, Json(status))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(status))
    }
}
