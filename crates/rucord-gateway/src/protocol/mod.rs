//! Gateway protocol definitions
//!
//! Op codes, close codes, the message envelope and the client/server payloads
//! exchanged over the gateway WebSocket.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceStatus, PresenceUpdatePayload,
    ReadyPayload, ResumePayload,
};

/// Gateway API version requested on connect
pub const API_VERSION: u8 = 10;

/// Append the version and encoding query to a gateway URL
///
/// URLs that already carry a query string are returned unchanged.
#[must_use]
pub fn gateway_endpoint(base: &str) -> String {
    if base.contains('?') {
        return base.to_string();
    }
    format!(
        "{}/?v={API_VERSION}&encoding=json",
        base.trim_end_matches('/')
    )
}
