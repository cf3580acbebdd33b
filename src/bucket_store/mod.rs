//! # Bucket Store
//!
//! Atomic token-bucket decisions against shared state. The trait is a
//! capability contract: a Redis-backed variant for
//! production, an in-process variant for tests and no-dependency
//! deployments — the same split `psenger_throttler::rate_limiter::RateLimiter`
//! draws between its `redis_client: Option<Arc<RedisClient>>` and its local
//! `HashMap`-backed buckets, just promoted to a proper trait so callers
//! don't need to know which one they hold.

mod in_process;
mod redis_store;

pub use in_process::InProcessBucketStore;
pub use redis_store::RedisBucketStore;

use crate::error::Result;
use crate::model::ConsumeOutcome;
use async_trait::async_trait;

/// Atomically decides and records consumption of `permits` tokens from one
/// named bucket described by `(capacity, window)`.
///
/// Implementations must serialize all operations on the same `bucket_key`
/// across every client of the store — this is the sole cross-instance
/// synchronization point in the whole system.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Runs the token-bucket refill-and-consume algorithm for one bucket.
    /// `capacity`, `window_nanos`, and `permits` must all be strictly
    /// positive; violating that is an
    /// `InvalidArgument` error that touches no state.
    async fn consume(
        &self,
        bucket_key: &str,
        capacity: u64,
        window_nanos: u64,
        permits: u64,
    ) -> Result<ConsumeOutcome>;

    /// Refunds `permits` tokens to `bucket_key` without otherwise changing
    /// the refill timeline. Used by the Rate Limiter to undo a partial
    /// multi-band success when a later band rejects.
    async fn compensate(&self, bucket_key: &str, permits: u64) -> Result<()>;

    /// Deletes bucket state. Idempotent.
    async fn reset(&self, bucket_key: &str) -> Result<()>;

    /// Deletes every bucket whose key starts with `prefix`, via an
    /// incremental, non-blocking keyspace traversal in bounded batches —
    /// never a full blocking scan.
    async fn reset_by_prefix(&self, prefix: &str) -> Result<u64>;
}

pub(crate) fn validate_consume_args(capacity: u64, window_nanos: u64, permits: u64) -> Result<()> {
    if capacity == 0 {
        return Err(crate::error::FluxGateError::InvalidArgument(
            "bucket capacity must be positive".to_string(),
        ));
    }
    if window_nanos == 0 {
        return Err(crate::error::FluxGateError::InvalidArgument(
            "bucket window must be positive".to_string(),
        ));
    }
    if permits == 0 {
        return Err(crate::error::FluxGateError::InvalidArgument(
            "permits must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Pure, side-effect-free implementation of the refill-and-consume algorithm, shared by
/// every `BucketStore` backend so the refill math is tested exactly once
/// and trusted everywhere else (the Redis backend runs this same shape of
/// logic inside a Lua script; see `redis_store::CONSUME_SCRIPT`).
pub(crate) fn compute_consume(
    now_nanos: u64,
    existing: Option<(u64, u64)>,
    capacity: u64,
    window_nanos: u64,
    permits: u64,
) -> (ConsumeOutcome, Option<(u64, u64)>) {
    let (tokens, last_refill_nanos) = existing.unwrap_or((capacity, now_nanos));

    let elapsed = now_nanos.saturating_sub(last_refill_nanos);
    let added = if elapsed > 0 {
        // integer-only: elapsed * capacity / window_nanos, never capacity / window_nanos
        ((elapsed as u128) * (capacity as u128) / (window_nanos as u128)) as u64
    } else {
        0
    };
    let new_tokens = capacity.min(tokens.saturating_add(added));

    let deficit = capacity - new_tokens;
    let nanos_to_full =
        if deficit == 0 { 0 } else { ceil_div_u128(deficit as u128 * window_nanos as u128, capacity as u128) };
    let reset_time_millis = (now_nanos as u128 + nanos_to_full as u128) as u64 / 1_000_000;

    if new_tokens >= permits {
        let remaining = new_tokens - permits;
        (
            ConsumeOutcome { allowed: true, remaining, nanos_to_wait: 0, reset_time_millis },
            Some((remaining, now_nanos)),
        )
    } else {
        let needed = permits - new_tokens;
        let nanos_to_wait = ceil_div_u128(needed as u128 * window_nanos as u128, capacity as u128);
        (
            ConsumeOutcome { allowed: false, remaining: new_tokens, nanos_to_wait, reset_time_millis },
            None,
        )
    }
}

fn ceil_div_u128(numerator: u128, denominator: u128) -> u64 {
    ((numerator + denominator - 1) / denominator) as u64
}
