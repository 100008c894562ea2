//! Shard buckets
//!
//! Shards sharing `shard_id % max_concurrency` share one identify slot.

mod shard_bucket;

pub use shard_bucket::{BucketSet, ShardBucket};
