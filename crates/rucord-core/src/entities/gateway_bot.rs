//! Gateway bot information
//!
//! Response body of `GET /gateway/bot`.

use serde::{Deserialize, Serialize};

/// Gateway URL and recommended sharding for a bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBotInfo {
    /// WSS URL to connect to
    pub url: String,

    /// Recommended number of shards
    pub shards: u32,

    /// Current session start limit
    pub session_start_limit: SessionStartLimit,
}

/// Session start budget for a bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    /// Total number of session starts allowed per reset period
    pub total: u32,

    /// Session starts remaining
    pub remaining: u32,

    /// Milliseconds until the budget resets
    pub reset_after: u64,

    /// Identify requests allowed per 5 seconds
    pub max_concurrency: u32,
}

impl SessionStartLimit {
    /// Check whether `shards` sessions can be started now
    #[inline]
    pub const fn can_start(&self, shards: u32) -> bool {
        self.remaining >= shards
    }
}
