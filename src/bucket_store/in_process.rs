//! In-process `BucketStore`: a `DashMap`-backed single-node variant for
//! tests and no-dependency deployments. Uses the same
//! `compute_consume` function the Redis script transliterates, so both
//! backends agree on every edge case by construction.

use super::{compute_consume, validate_consume_args, BucketStore};
use crate::error::Result;
use crate::model::ConsumeOutcome;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic nanosecond clock anchored at construction time, standing in
/// for the bucket store's own server-side clock (never the caller's). A
/// wall-clock-based `SystemTime` would work too; `Instant` sidesteps clock
/// adjustments entirely within one process.
struct Clock {
    origin: Instant,
}

impl Clock {
    fn new() -> Self {
        Self { origin: Instant::now() }
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64
    }
}

pub struct InProcessBucketStore {
    clock: Clock,
    buckets: DashMap<String, (AtomicU64, AtomicU64)>,
}

impl Default for InProcessBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBucketStore {
    pub fn new() -> Self {
        Self { clock: Clock::new(), buckets: DashMap::new() }
    }
}

#[async_trait]
impl BucketStore for InProcessBucketStore {
    async fn consume(
        &self,
        bucket_key: &str,
        capacity: u64,
        window_nanos: u64,
        permits: u64,
    ) -> Result<ConsumeOutcome> {
        validate_consume_args(capacity, window_nanos, permits)?;
        let now_nanos = self.clock.now_nanos();

        // entry-level locking inside DashMap's shard gives every bucket key
        // the same serialized access a shared store must provide.
        let entry = self
            .buckets
            .entry(bucket_key.to_string())
            .or_insert_with(|| (AtomicU64::new(capacity), AtomicU64::new(now_nanos)));

        let tokens = entry.0.load(Ordering::Relaxed);
        let last_refill_nanos = entry.1.load(Ordering::Relaxed);

        let (outcome, new_state) = compute_consume(
            now_nanos,
            Some((tokens, last_refill_nanos)),
            capacity,
            window_nanos,
            permits,
        );

        if let Some((new_tokens, new_last_refill)) = new_state {
            entry.0.store(new_tokens, Ordering::Relaxed);
            entry.1.store(new_last_refill, Ordering::Relaxed);
        }

        Ok(outcome)
    }

    async fn compensate(&self, bucket_key: &str, permits: u64) -> Result<()> {
        if let Some(entry) = self.buckets.get(bucket_key) {
            entry.0.fetch_add(permits, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn reset(&self, bucket_key: &str) -> Result<()> {
        self.buckets.remove(bucket_key);
        Ok(())
    }

    async fn reset_by_prefix(&self, prefix: &str) -> Result<u64> {
        let keys: Vec<String> = self
            .buckets
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        let count = keys.len() as u64;
        for key in keys {
            self.buckets.remove(&key);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn independent_buckets_do_not_share_state() {
        let store = InProcessBucketStore::new();
        let window = Duration::from_secs(60).as_nanos() as u64;

        let a1 = store.consume("user:a", 1, window, 1).await.unwrap();
        assert!(a1.allowed);
        let a2 = store.consume("user:a", 1, window, 1).await.unwrap();
        assert!(!a2.allowed);

        // a different subject's bucket is untouched by user:a's exhaustion
        let b1 = store.consume("user:b", 1, window, 1).await.unwrap();
        assert!(b1.allowed);
    }

    #[tokio::test]
    async fn reset_by_prefix_only_removes_matching_keys() {
        let store = InProcessBucketStore::new();
        let window = 60_000_000_000u64;
        store.consume("rs1:r1:ip:1", 5, window, 1).await.unwrap();
        store.consume("rs1:r1:ip:2", 5, window, 1).await.unwrap();
        store.consume("rs2:r1:ip:1", 5, window, 1).await.unwrap();

        let removed = store.reset_by_prefix("rs1:").await.unwrap();
        assert_eq!(removed, 2);

        // rs2's bucket survives untouched
        let outcome = store.consume("rs2:r1:ip:1", 5, window, 1).await.unwrap();
        assert_eq!(outcome.remaining, 3);
    }

    #[tokio::test]
    async fn compensate_refunds_without_exceeding_capacity() {
        let store = InProcessBucketStore::new();
        let window = 60_000_000_000u64;
        store.consume("k", 3, window, 2).await.unwrap();
        store.compensate("k", 2).await.unwrap();
        let outcome = store.consume("k", 3, window, 1).await.unwrap();
        // refunded back to near-full capacity, allowing the next permit
        assert!(outcome.allowed);
    }
}
