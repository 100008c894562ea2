//! Shard bucket grouping

use crate::error::{GatewayError, GatewayResult};
use crate::ratelimit::{IdentifyPermit, IdentifyRateLimiter};
use rucord_core::ShardId;
use std::sync::Arc;

/// Shards that identify through the same rate-limit bucket
#[derive(Debug)]
pub struct ShardBucket {
    id: u32,
    shards: Vec<ShardId>,
    limiter: Arc<IdentifyRateLimiter>,
}

impl ShardBucket {
    #[must_use]
    pub fn new(id: u32, shards: Vec<ShardId>, limiter: Arc<IdentifyRateLimiter>) -> Self {
        Self {
            id,
            shards,
            limiter,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Shards in this bucket, ascending
    #[must_use]
    pub fn shards(&self) -> &[ShardId] {
        &self.shards
    }

    #[must_use]
    pub fn contains(&self, shard_id: ShardId) -> bool {
        self.shards.contains(&shard_id)
    }

    /// Wait for this bucket's next identify slot
    pub async fn identify_slot(&self) -> IdentifyPermit {
        self.limiter.acquire(self.id).await
    }
}

/// All buckets of one sharded session
#[derive(Debug)]
pub struct BucketSet {
    max_concurrency: u32,
    buckets: Vec<Arc<ShardBucket>>,
}

impl BucketSet {
    /// Partition `0..shard_count` into buckets
    pub fn new(
        shard_count: u32,
        max_concurrency: u32,
        limiter: &Arc<IdentifyRateLimiter>,
    ) -> GatewayResult<Self> {
        if shard_count == 0 {
            return Err(GatewayError::InvalidShardConfig(
                "shard count must be at least 1".to_string(),
            ));
        }
        if max_concurrency == 0 {
            return Err(GatewayError::InvalidShardConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let bucket_count = max_concurrency.min(shard_count);
        let buckets = (0..bucket_count)
            .map(|bucket_id| {
                let shards = (bucket_id..shard_count)
                    .step_by(max_concurrency as usize)
                    .collect();
                Arc::new(ShardBucket::new(bucket_id, shards, Arc::clone(limiter)))
            })
            .collect();

        Ok(Self {
            max_concurrency,
            buckets,
        })
    }

    #[must_use]
    pub const fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    /// Bucket a shard identifies through
    #[must_use]
    pub fn bucket_for(&self, shard_id: ShardId) -> Option<Arc<ShardBucket>> {
        let bucket = self.buckets.get((shard_id % self.max_concurrency) as usize)?;
        bucket.contains(shard_id).then(|| Arc::clone(bucket))
    }

    /// Wait for the next identify slot of `bucket_id`
    pub async fn identify_slot(&self, bucket_id: u32) -> GatewayResult<IdentifyPermit> {
        let bucket = self.buckets.get(bucket_id as usize).ok_or_else(|| {
            GatewayError::InvalidShardConfig(format!("no identify bucket {bucket_id}"))
        })?;
        Ok(bucket.identify_slot().await)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShardBucket>> {
        self.buckets.iter()
    }
}
