//! Integration test utilities for the gateway
//!
//! This crate runs a mock Discord gateway (WebSocket plus `/gateway/bot`)
//! on an ephemeral localhost port so shards can be tested over real sockets.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
