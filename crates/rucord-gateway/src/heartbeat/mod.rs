//! Heartbeating
//!
//! Keeps one connection alive and detects when the gateway stops answering.

mod driver;
mod state;

pub use driver::{first_beat_delay, HeartbeatDriver};
pub use state::HeartbeatState;
