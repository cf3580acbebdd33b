//! Three-state circuit breaker (closed/open/half-open), one instance per
//! named resource. Deliberately independent of `Retrier`: the two
//! compose at the call site rather than one wrapping the other, so callers
//! that want breaker-only or retry-only behavior can use either alone.
//! `enabled = false` turns every resource into a permanent pass-through
//! with no state at all, which is what lets a caller always build the
//! wrapper and still get retry-only or breaker-only behavior.

use crate::error::{FluxGateError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// What a call should do while the breaker is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Let the request through without consulting the store.
    FailOpen,
    /// Reject with `CircuitOpen` until the breaker recovers.
    FailClosed,
}

struct ResourceBreaker {
    state: Mutex<CircuitState>,
    failure_count: AtomicU32,
    opened_at_millis: AtomicU64,
    half_open_calls_in_flight: AtomicU32,
}

impl ResourceBreaker {
    fn new() -> Self {
        Self {
            state: Mutex::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_calls_in_flight: AtomicU32::new(0),
        }
    }
}

pub struct CircuitBreaker {
    enabled: bool,
    failure_threshold: u32,
    wait_in_open: Duration,
    permitted_in_half_open: u32,
    fallback: FallbackStrategy,
    resources: DashMap<String, ResourceBreaker>,
    epoch: Instant,
}

impl CircuitBreaker {
    /// `enabled = false` makes every call a direct pass-through with no
    /// state tracking at all — equivalent to fail-open with no breaker,
    /// so `retry`-only deployments don't pay for tripped-state bookkeeping
    /// they never asked for.
    pub fn new(
        enabled: bool,
        failure_threshold: u32,
        wait_in_open: Duration,
        permitted_in_half_open: u32,
        fallback: FallbackStrategy,
    ) -> Self {
        Self {
            enabled,
            failure_threshold,
            wait_in_open,
            permitted_in_half_open,
            fallback,
            resources: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn state_of(&self, resource: &str) -> CircuitState {
        if !self.enabled {
            return CircuitState::Closed;
        }
        self.resources
            .entry(resource.to_string())
            .or_insert_with(ResourceBreaker::new)
            .state
            .lock()
            .unwrap()
            .clone()
    }

    /// Runs `operation` through the named resource's breaker. When open,
    /// this never calls `operation` — the store is not contacted either
    /// way. `fallback` only changes what the caller sees while short-
    /// circuited: `FailClosed` surfaces `CircuitOpen` as an error;
    /// `FailOpen` still surfaces `CircuitOpen`, but callers that want a
    /// real fallback value (e.g. `Engine::check`'s allow-without-rule)
    /// catch it one layer up, since only the caller knows what an
    /// acceptable stand-in result looks like for its own `T`.
    pub async fn call<F, Fut, T>(&self, resource: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.enabled {
            return operation().await;
        }

        if !self.before_call(resource) {
            match self.fallback {
                FallbackStrategy::FailOpen => {
                    debug!(resource, "circuit open, fail-open: short-circuiting without contacting the store");
                }
                FallbackStrategy::FailClosed => {
                    debug!(resource, "circuit open, fail-closed: rejecting without contacting the store");
                }
            }
            return Err(FluxGateError::CircuitOpen(resource.to_string()));
        }

        match operation().await {
            Ok(value) => {
                self.on_success(resource);
                Ok(value)
            }
            Err(err) => {
                if err.trips_breaker() {
                    self.on_failure(resource);
                }
                Err(err)
            }
        }
    }

    /// Returns whether the call should proceed; transitions open→half-open
    /// once `wait_in_open` has elapsed, and caps concurrent half-open probes.
    fn before_call(&self, resource: &str) -> bool {
        let breaker = self.resources.entry(resource.to_string()).or_insert_with(ResourceBreaker::new);
        let mut state = breaker.state.lock().unwrap();

        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = breaker.opened_at_millis.load(Ordering::SeqCst);
                if self.now_millis().saturating_sub(opened_at) >= self.wait_in_open.as_millis() as u64 {
                    *state = CircuitState::HalfOpen;
                    breaker.half_open_calls_in_flight.store(0, Ordering::SeqCst);
                    info!(resource, "circuit breaker open -> half-open");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let in_flight = breaker.half_open_calls_in_flight.fetch_add(1, Ordering::SeqCst);
                in_flight < self.permitted_in_half_open
            }
        }
    }

    fn on_success(&self, resource: &str) {
        if let Some(breaker) = self.resources.get(resource) {
            let mut state = breaker.state.lock().unwrap();
            if *state != CircuitState::Closed {
                info!(resource, "circuit breaker -> closed");
            }
            *state = CircuitState::Closed;
            breaker.failure_count.store(0, Ordering::SeqCst);
        }
    }

    fn on_failure(&self, resource: &str) {
        let breaker = self.resources.entry(resource.to_string()).or_insert_with(ResourceBreaker::new);
        let mut state = breaker.state.lock().unwrap();

        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                breaker.opened_at_millis.store(self.now_millis(), Ordering::SeqCst);
                info!(resource, "circuit breaker half-open -> open");
            }
            CircuitState::Closed => {
                let failures = breaker.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.failure_threshold {
                    *state = CircuitState::Open;
                    breaker.opened_at_millis.store(self.now_millis(), Ordering::SeqCst);
                    info!(resource, failures, "circuit breaker closed -> open");
                }
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new(true, 2, Duration::from_millis(50), 1, FallbackStrategy::FailClosed);

        for _ in 0..2 {
            let _: Result<()> = breaker
                .call("store", || async { Err(FluxGateError::StoreFatal("down".to_string())) })
                .await;
        }

        assert_eq!(breaker.state_of("store"), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_fail_closed_calls() {
        let breaker = CircuitBreaker::new(true, 1, Duration::from_secs(60), 1, FallbackStrategy::FailClosed);
        let _: Result<()> = breaker
            .call("store", || async { Err(FluxGateError::StoreFatal("down".to_string())) })
            .await;

        let result: Result<()> = breaker.call("store", || async { Ok(()) }).await;
        assert!(matches!(result, Err(FluxGateError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_contacting_store_even_on_fail_open() {
        let breaker = CircuitBreaker::new(true, 1, Duration::from_secs(60), 1, FallbackStrategy::FailOpen);
        let _: Result<()> = breaker
            .call("store", || async { Err(FluxGateError::StoreFatal("down".to_string())) })
            .await;
        assert_eq!(breaker.state_of("store"), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result: Result<&'static str> = breaker
            .call("store", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("served") }
            })
            .await;

        assert!(matches!(result, Err(FluxGateError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "fail-open must not contact the store while the circuit is open");
    }

    #[tokio::test]
    async fn disabled_breaker_is_a_pure_pass_through() {
        let breaker = CircuitBreaker::new(false, 1, Duration::from_secs(60), 1, FallbackStrategy::FailClosed);
        let _: Result<()> = breaker
            .call("store", || async { Err(FluxGateError::StoreFatal("down".to_string())) })
            .await;

        // a real breaker would be open by now; a disabled one never trips
        assert_eq!(breaker.state_of("store"), CircuitState::Closed);
        let result: Result<&'static str> = breaker.call("store", || async { Ok("served") }).await;
        assert_eq!(result.unwrap(), "served");
    }

    #[tokio::test]
    async fn half_open_success_closes_circuit() {
        let breaker = CircuitBreaker::new(true, 1, Duration::from_millis(10), 1, FallbackStrategy::FailClosed);
        let _: Result<()> = breaker
            .call("store", || async { Err(FluxGateError::StoreFatal("down".to_string())) })
            .await;
        assert_eq!(breaker.state_of("store"), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result: Result<&'static str> = breaker.call("store", || async { Ok("recovered") }).await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(breaker.state_of("store"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn non_breaker_errors_do_not_count_as_failures() {
        let breaker = CircuitBreaker::new(true, 1, Duration::from_secs(60), 1, FallbackStrategy::FailClosed);
        let result: Result<()> = breaker
            .call("store", || async { Err(FluxGateError::InvalidArgument("bad".to_string())) })
            .await;
        assert!(result.is_err());
        assert_eq!(breaker.state_of("store"), CircuitState::Closed);
    }
}
