//! # HTTP Server Module
//!
//! Wires a `Config` into a running `Engine` and axum `Router`: bucket
//! store (Redis, resilience-wrapped) and rule store (MongoDB,
//! resilience-wrapped) share one circuit breaker keyed by resource name,
//! then rule cache, reload strategy, and the bucket reset listener are
//! layered on top. Serves the handlers in `handlers.rs` behind the same
//! `TraceLayer`/`CorsLayer` stack and graceful-shutdown signal handling
//! the teacher's `Server` used.

use crate::bucket_reset_handler::BucketResetHandler;
use crate::bucket_store::{BucketStore, RedisBucketStore};
use crate::caching_provider::CachingProvider;
use crate::config::{Config, FallbackStrategySetting, ReloadStrategySetting};
use crate::engine::Engine;
use crate::handlers::{check_rate_limit, health_check, readiness_check, AppState};
use crate::health::HealthChecker;
use crate::key_resolver::KeyResolverRegistry;
use crate::metrics::MetricsCollector;
use crate::rate_limiter::RateLimiter;
use crate::reload::{NoneReloadStrategy, PollingReloadStrategy, PubSubReloadStrategy, ReloadStrategy};
use crate::resilience::{CircuitBreaker, ResilientBucketStore, ResilientRuleStore, Retrier};
use crate::rule_cache::RuleCache;
use crate::rule_store::{MongoRuleStore, RuleStore};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const BUCKET_STORE_RESOURCE: &str = "bucket_store";

/// Used only to resolve `reload.strategy = auto` at startup: a quick
/// connect-and-PING, independent of the long-lived `ConnectionManager`
/// the real bucket store and pub/sub strategy each build for themselves.
async fn redis_is_reachable(redis_url: &str) -> bool {
    let Ok(client) = redis::Client::open(redis_url) else { return false };
    let Ok(mut conn) = client.get_multiplexed_async_connection().await else { return false };
    redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
}

pub struct Server {
    app: Router,
    bind_address: String,
    engine: Arc<Engine>,
}

/// Builds every collaborator `Engine` needs from `config` and assembles
/// the axum router. Returns the `Engine` alongside the router so
/// `Server::run` can start/stop its reload strategy around the HTTP
/// server's own lifetime.
pub async fn create_app(config: &Config) -> crate::error::Result<(Router, Arc<Engine>)> {
    // Built once and shared by the Bucket Store and Rule Store wrappers:
    // both are network calls on the request path and get the same retry
    // budget and per-resource breaker state (§4.9). `enabled=false` on
    // either config knob makes its half of the composition a pass-through,
    // so the two stay independently toggleable.
    let circuit_breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker.enabled,
        config.circuit_breaker.failure_threshold,
        Duration::from_secs(config.circuit_breaker.wait_in_open_seconds),
        config.circuit_breaker.permitted_in_half_open,
        config.circuit_breaker.fallback.into(),
    ));

    let mongo_rule_store: Arc<dyn RuleStore> =
        Arc::new(MongoRuleStore::connect(&config.mongo_uri, &config.mongo_database, &config.mongo_collection).await?);
    let rule_store: Arc<dyn RuleStore> = Arc::new(ResilientRuleStore::new(
        mongo_rule_store,
        Retrier::new((&config.retry).into()),
        circuit_breaker.clone(),
    ));

    let rule_cache = Arc::new(RuleCache::new(
        rule_store,
        config.cache.max_size,
        Duration::from_secs(config.cache.ttl_seconds),
        Duration::from_secs(config.cache.negative_ttl_seconds),
    ));

    let resolved_strategy = match config.reload.strategy {
        ReloadStrategySetting::Auto => {
            if redis_is_reachable(&config.redis_url).await {
                ReloadStrategySetting::Pubsub
            } else {
                tracing::warn!("reload.strategy=auto: shared store unreachable at startup, falling back to polling");
                ReloadStrategySetting::Polling
            }
        }
        other => other,
    };

    let reload_strategy: Arc<dyn ReloadStrategy> = match resolved_strategy {
        ReloadStrategySetting::None => Arc::new(NoneReloadStrategy),
        ReloadStrategySetting::Polling => Arc::new(PollingReloadStrategy::new(
            Duration::from_secs(config.reload.polling_interval_seconds),
            Duration::from_secs(config.reload.initial_delay_seconds),
        )),
        ReloadStrategySetting::Pubsub => Arc::new(PubSubReloadStrategy::new(
            config.redis_url.clone(),
            config.reload.pubsub_channel.clone(),
            config.reload.pubsub_max_reconnect_attempts,
        )),
        ReloadStrategySetting::Auto => unreachable!("resolved above"),
    };

    let redis_bucket_store: Arc<dyn BucketStore> = Arc::new(RedisBucketStore::connect(&config.redis_url).await?);
    let bucket_store: Arc<dyn BucketStore> = Arc::new(ResilientBucketStore::new(
        redis_bucket_store,
        Retrier::new((&config.retry).into()),
        circuit_breaker.clone(),
    ));

    let caching_provider = if config.reload.reset_buckets_on_change {
        let bucket_reset_handler = Arc::new(BucketResetHandler::new(bucket_store.clone()));
        Arc::new(CachingProvider::with_downstream_listener(rule_cache, reload_strategy, bucket_reset_handler))
    } else {
        Arc::new(CachingProvider::new(rule_cache, reload_strategy))
    };

    let rate_limiter = RateLimiter::new(bucket_store, Arc::new(KeyResolverRegistry::with_defaults()));
    // §5's fail-open request policy reuses `circuitBreaker.fallback`: it is
    // already the deployment's one answer to "what do we do when the
    // shared infrastructure is unreachable", whether or not a breaker or
    // retry is what actually surfaced the failure.
    let fail_open = config.circuit_breaker.fallback == FallbackStrategySetting::FailOpen;
    let engine = Arc::new(Engine::new(caching_provider, rate_limiter, config.on_missing_rule_set.into(), fail_open));

    let metrics = Arc::new(MetricsCollector::new());
    let health_checker = Arc::new(HealthChecker::new(circuit_breaker, BUCKET_STORE_RESOURCE));
    let validator = Arc::new(crate::validation::RequestValidator::new());
    let wait_for_refill = Arc::new(crate::handlers::WaitForRefillGate::new(config.wait_for_refill.clone()));

    let state = AppState { engine: engine.clone(), metrics, validator, health_checker, wait_for_refill };

    let app = Router::new()
        .route("/rule-sets/{rule_set_id}/check", post(check_rate_limit))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()));

    Ok((app, engine))
}

impl Server {
    pub async fn new(config: &Config) -> crate::error::Result<Self> {
        let (app, engine) = create_app(config).await?;
        Ok(Self { app, bind_address: config.bind_address.clone(), engine })
    }

    /// Starts the Engine's reload strategy and the bucket reset listener,
    /// then serves until a shutdown signal arrives, stopping the reload
    /// strategy before returning.
    pub async fn run(self) -> crate::error::Result<()> {
        self.engine.start().await?;

        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .map_err(|e| crate::error::FluxGateError::ConfigError(format!("failed to bind {}: {e}", self.bind_address)))?;

        tracing::info!("fluxgate server starting on {}", self.bind_address);
        tracing::info!("health check available at /health");
        tracing::info!("readiness check available at /ready");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error::FluxGateError::InternalError(e.to_string()))?;

        self.engine.stop().await;
        Ok(())
    }
}

/// Waits for `SIGINT` (Ctrl+C) or, on Unix, `SIGTERM` — whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        },
    }
}
