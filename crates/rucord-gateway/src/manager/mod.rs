//! Gateway manager
//!
//! Owns every shard of a bot, the shared identify limiter and the merged
//! event stream.

mod manager;
mod stream;

pub use manager::{GatewayManager, DEFAULT_STARTUP_TIMEOUT};
pub use stream::EventStream;
