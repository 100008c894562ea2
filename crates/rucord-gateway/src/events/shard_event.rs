//! Per-shard event envelope

use super::GatewayEvent;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use rucord_core::ShardId;

/// An event received by one shard
#[derive(Debug, Clone)]
pub struct ShardEvent {
    /// Shard the event arrived on
    pub shard_id: ShardId,
    /// The event itself
    pub event: GatewayEvent,
    /// Wall-clock receive time
    pub received_at: DateTime<Utc>,
}

impl ShardEvent {
    /// Wrap an event received now
    #[must_use]
    pub fn new(shard_id: ShardId, event: GatewayEvent) -> Self {
        Self {
            shard_id,
            event,
            received_at: Utc::now(),
        }
    }

    /// Dispatch event name, if any
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.event.as_dispatch().map(|d| d.name.as_str())
    }

    /// Dispatch sequence number, if any
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.event.as_dispatch().map(|d| d.sequence)
    }
}

/// A shard that stopped for good
#[derive(Debug)]
pub struct ShardFailure {
    /// Shard that stopped
    pub shard_id: ShardId,
    /// Why it stopped
    pub error: GatewayError,
}
