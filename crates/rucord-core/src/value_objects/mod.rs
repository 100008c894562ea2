//! Value objects - immutable types that describe a gateway session

mod intents;
mod shard;

pub use intents::GatewayIntents;
pub use shard::{ShardId, ShardInfo, ShardInfoError};
