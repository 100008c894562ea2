//! Discord REST lookups needed to start a gateway session

mod gateway_bot;

pub use gateway_bot::GatewayBotClient;
