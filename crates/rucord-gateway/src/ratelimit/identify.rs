//! Identify rate limiter
//!
//! The gateway accepts one Identify per rate-limit bucket every five seconds,
//! where a shard's bucket is `shard_id % max_concurrency`. Waiters on the same
//! bucket are served in arrival order.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Minimum spacing between two identifies of one bucket
pub const IDENTIFY_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct BucketClock {
    last_granted: Option<Instant>,
}

/// Proof that an identify slot was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyPermit {
    bucket_id: u32,
    granted_at: Instant,
}

impl IdentifyPermit {
    /// Bucket the permit was granted on
    #[must_use]
    pub const fn bucket_id(&self) -> u32 {
        self.bucket_id
    }

    /// When the slot was granted
    #[must_use]
    pub const fn granted_at(&self) -> Instant {
        self.granted_at
    }
}

/// Identify rate limiter shared by every shard of a manager
#[derive(Debug)]
pub struct IdentifyRateLimiter {
    window: Duration,
    buckets: DashMap<u32, Arc<Mutex<BucketClock>>>,
}

impl IdentifyRateLimiter {
    /// Create a limiter with the gateway's five second window
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(IDENTIFY_WINDOW)
    }

    /// Create a limiter with a custom window
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }

    /// Spacing enforced between grants of one bucket
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Wait for the next identify slot of `bucket_id`
    ///
    /// Cancel-safe: dropping the future before it resolves consumes no slot.
    pub async fn acquire(&self, bucket_id: u32) -> IdentifyPermit {
        // Clone out of the map so no shard lock is held across the await
        let clock = Arc::clone(&self.buckets.entry(bucket_id).or_default());

        let mut clock = clock.lock().await;
        if let Some(last) = clock.last_granted {
            let ready_at = last + self.window;
            if Instant::now() < ready_at {
                tracing::debug!(
                    bucket_id,
                    wait = ?(ready_at - Instant::now()),
                    "Waiting for identify slot"
                );
                sleep_until(ready_at).await;
            }
        }

        let granted_at = Instant::now();
        clock.last_granted = Some(granted_at);
        tracing::trace!(bucket_id, "Identify slot granted");

        IdentifyPermit {
            bucket_id,
            granted_at,
        }
    }

    /// Time of the most recent grant, if the bucket is not busy
    #[must_use]
    pub fn last_granted(&self, bucket_id: u32) -> Option<Instant> {
        let clock = self.buckets.get(&bucket_id)?;
        let last = clock.try_lock().ok()?.last_granted;
        last
    }

    /// Number of buckets with state
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop all bucket state
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

impl Default for IdentifyRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_first_grant_is_immediate() {
        let limiter = IdentifyRateLimiter::new();
        let start = Instant::now();
        let permit = limiter.acquire(0).await;
        assert_eq!(permit.granted_at(), start);
        assert_eq!(permit.bucket_id(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_bucket_grants_are_spaced() {
        let limiter = IdentifyRateLimiter::new();
        let first = limiter.acquire(0).await;
        let second = limiter.acquire(0).await;
        let third = limiter.acquire(0).await;

        assert_eq!(second.granted_at() - first.granted_at(), IDENTIFY_WINDOW);
        assert_eq!(third.granted_at() - second.granted_at(), IDENTIFY_WINDOW);
        assert_eq!(limiter.last_granted(0), Some(third.granted_at()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_are_independent() {
        let limiter = IdentifyRateLimiter::new();
        let start = Instant::now();
        let a = limiter.acquire(0).await;
        let b = limiter.acquire(1).await;
        assert_eq!(a.granted_at(), start);
        assert_eq!(b.granted_at(), start);
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_are_served_in_arrival_order() {
        let limiter = Arc::new(IdentifyRateLimiter::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for shard in 0..4u32 {
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            tokio::spawn(async move {
                let permit = limiter.acquire(0).await;
                let _ = tx.send((shard, permit.granted_at()));
            });
            // Let the task reach the bucket lock before spawning the next
            tokio::task::yield_now().await;
        }
        drop(tx);

        let mut grants = Vec::new();
        while let Some(grant) = rx.recv().await {
            grants.push(grant);
        }

        let order: Vec<u32> = grants.iter().map(|(shard, _)| *shard).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        for pair in grants.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= IDENTIFY_WINDOW);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_consumes_no_slot() {
        let limiter = IdentifyRateLimiter::new();
        let first = limiter.acquire(0).await;

        // Give up halfway through the window
        let cancelled = timeout(Duration::from_secs(2), limiter.acquire(0)).await;
        assert!(cancelled.is_err());

        let next = limiter.acquire(0).await;
        assert_eq!(next.granted_at() - first.granted_at(), IDENTIFY_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_bucket_grants_twice_within_window() {
        for max_concurrency in 1..=4u32 {
            for shard_count in 1..=8u32 {
                let limiter = Arc::new(IdentifyRateLimiter::new());
                let mut tasks = Vec::new();
                for shard_id in 0..shard_count {
                    let limiter = Arc::clone(&limiter);
                    let bucket = shard_id % max_concurrency;
                    tasks.push(tokio::spawn(async move {
                        (bucket, limiter.acquire(bucket).await.granted_at())
                    }));
                }

                let mut grants = Vec::new();
                for task in tasks {
                    grants.push(task.await.unwrap());
                }

                for (i, (bucket_a, at_a)) in grants.iter().enumerate() {
                    for (bucket_b, at_b) in &grants[i + 1..] {
                        if bucket_a == bucket_b {
                            let gap = if at_a > at_b { *at_a - *at_b } else { *at_b - *at_a };
                            assert!(
                                gap >= IDENTIFY_WINDOW,
                                "bucket {bucket_a} granted twice within {gap:?} \
                                 (max_concurrency={max_concurrency}, shards={shard_count})"
                            );
                        }
                    }
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_releases_state() {
        let limiter = IdentifyRateLimiter::with_window(Duration::from_millis(100));
        limiter.acquire(0).await;
        limiter.acquire(1).await;
        limiter.clear();
        assert_eq!(limiter.bucket_count(), 0);
        assert_eq!(limiter.last_granted(0), None);

        let start = Instant::now();
        assert_eq!(limiter.acquire(0).await.granted_at(), start);
    }
}
