//! # rucord-core
//!
//! Value objects shared by the gateway crates: intents, shard identity and the
//! gateway bot information returned by Discord.
//! This crate has no dependency on the async runtime or the network stack.

pub mod entities;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{GatewayBotInfo, SessionStartLimit};
pub use value_objects::{GatewayIntents, ShardId, ShardInfo, ShardInfoError};
