//! Shards
//!
//! A shard owns one gateway session for one `[shard_id, shard_count]` slice
//! and keeps it alive across reconnects.

mod config;
mod handle;
mod shard;

pub use config::ShardConfig;
pub use handle::{ShardHandle, ShardSender};
pub use shard::{Shard, ShardContext};

pub(crate) use handle::{wait_until_settled, ShardCommand};
