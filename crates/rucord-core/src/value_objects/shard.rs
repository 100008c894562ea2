//! Shard identity
//!
//! A shard is addressed by `(shard_id, shard_count)`. Guilds are partitioned
//! across shards by `(guild_id >> 22) % shard_count`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Zero-based shard index
pub type ShardId = u32;

/// Errors produced when building a [`ShardInfo`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardInfoError {
    #[error("shard count must be at least 1")]
    ZeroShardCount,

    #[error("shard id {id} is out of range for {total} shards")]
    IdOutOfRange { id: ShardId, total: u32 },
}

/// Identity of one shard within a sharded session
///
/// Serialized as the `[id, total]` pair used in the Identify payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "[u32; 2]", try_from = "[u32; 2]")]
pub struct ShardInfo {
    id: ShardId,
    total: u32,
}

impl ShardInfo {
    /// Create a shard identity, validating that `id < total`
    pub fn new(id: ShardId, total: u32) -> Result<Self, ShardInfoError> {
        if total == 0 {
            return Err(ShardInfoError::ZeroShardCount);
        }
        if id >= total {
            return Err(ShardInfoError::IdOutOfRange { id, total });
        }
        Ok(Self { id, total })
    }

    /// Get the shard index
    #[inline]
    pub const fn id(&self) -> ShardId {
        self.id
    }

    /// Get the total number of shards
    #[inline]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Identify rate-limit bucket of this shard for the given `max_concurrency`
    #[inline]
    pub const fn bucket(&self, max_concurrency: u32) -> u32 {
        if max_concurrency == 0 {
            return 0;
        }
        self.id % max_concurrency
    }

    /// Shard responsible for a guild
    #[inline]
    pub const fn for_guild(guild_id: u64, total: u32) -> ShardId {
        ((guild_id >> 22) % total as u64) as ShardId
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.id, self.total)
    }
}

impl From<ShardInfo> for [u32; 2] {
    fn from(info: ShardInfo) -> Self {
        [info.id, info.total]
    }
}

impl TryFrom<[u32; 2]> for ShardInfo {
    type Error = ShardInfoError;

    fn try_from([id, total]: [u32; 2]) -> Result<Self, Self::Error> {
        Self::new(id, total)
    }
}
