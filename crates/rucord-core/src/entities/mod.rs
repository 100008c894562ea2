//! Entities returned by the Discord HTTP API that the gateway depends on

mod gateway_bot;

pub use gateway_bot::{GatewayBotInfo, SessionStartLimit};
