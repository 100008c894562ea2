//! Gateway events
//!
//! Typed view of inbound gateway messages and the per-shard envelope handed
//! to consumers.

mod event_types;
mod gateway_event;
mod shard_event;

pub use event_types::GatewayEventType;
pub use gateway_event::{DispatchEvent, GatewayEvent};
pub use shard_event::{ShardEvent, ShardFailure};
