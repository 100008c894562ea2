//! Gateway payload definitions
//!
//! Payload structures carried in the `d` field of gateway messages.

use rucord_core::{GatewayIntents, ShardInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Interval the production gateway currently announces
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 41_250;

    /// Create a Hello payload with the default interval
    #[must_use]
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Create a Hello payload with custom interval
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for op 2 (Identify)
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Bot token, without the `Bot ` prefix
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Requested event categories
    pub intents: GatewayIntents,

    /// `[shard_id, shard_count]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardInfo>,

    /// Member count above which offline members are not sent in GUILD_CREATE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u32>,

    /// Initial presence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdatePayload>,
}

impl fmt::Debug for IdentifyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifyPayload")
            .field("token", &"[REDACTED]")
            .field("properties", &self.properties)
            .field("intents", &self.intents)
            .field("shard", &self.shard)
            .field("large_threshold", &self.large_threshold)
            .field("presence", &self.presence)
            .finish()
    }
}

/// Client connection properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,

    /// Library name
    pub browser: String,

    /// Library name
    pub device: String,
}

impl IdentifyProperties {
    /// Library name reported to the gateway
    pub const LIBRARY: &'static str = "rucord";

    /// Set operating system
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Set browser
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Set device type
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: Self::LIBRARY.to_string(),
            device: Self::LIBRARY.to_string(),
        }
    }
}

/// Presence status values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Dnd,
    Idle,
    Invisible,
    Offline,
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix time in milliseconds when the client went idle
    pub since: Option<u64>,

    /// Activity objects, passed through untouched
    #[serde(default)]
    pub activities: Vec<Value>,

    /// New status
    pub status: PresenceStatus,

    /// Whether the client is AFK
    #[serde(default)]
    pub afk: bool,
}

impl PresenceUpdatePayload {
    /// Presence with a status and no activities
    #[must_use]
    pub fn new(status: PresenceStatus) -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status,
            afk: false,
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Bot token, without the `Bot ` prefix
    pub token: String,

    /// Session being resumed
    pub session_id: String,

    /// Last sequence number received
    pub seq: u64,
}

impl fmt::Debug for ResumePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumePayload")
            .field("token", &"[REDACTED]")
            .field("session_id", &self.session_id)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Data of the READY dispatch
///
/// Only the fields the connection core needs are typed. Everything else stays
/// in the dispatch payload forwarded to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Gateway version
    #[serde(default)]
    pub v: u8,

    /// Session identifier used for Resume
    pub session_id: String,

    /// URL to use when resuming this session
    #[serde(default)]
    pub resume_gateway_url: Option<String>,

    /// Shard this session belongs to
    #[serde(default)]
    pub shard: Option<ShardInfo>,

    /// The bot user
    #[serde(default)]
    pub user: Value,

    /// Unavailable guilds assigned to this shard
    #[serde(default)]
    pub guilds: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identify() -> IdentifyPayload {
        IdentifyPayload {
            token: "secret-token".to_string(),
            properties: IdentifyProperties::default(),
            intents: GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES,
            shard: Some(ShardInfo::new(1, 2).unwrap()),
            large_threshold: None,
            presence: None,
        }
    }

    #[test]
    fn test_identify_wire_format() {
        let json = serde_json::to_value(identify()).unwrap();
        assert_eq!(json["token"], "secret-token");
        assert_eq!(json["intents"], 513);
        assert_eq!(json["shard"], serde_json::json!([1, 2]));
        assert_eq!(json["properties"]["browser"], "rucord");
        assert!(json.get("large_threshold").is_none());
        assert!(json.get("presence").is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", identify());
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("REDACTED"));

        let resume = ResumePayload {
            token: "secret-token".to_string(),
            session_id: "abc".to_string(),
            seq: 7,
        };
        assert!(!format!("{resume:?}").contains("secret-token"));
    }

    #[test]
    fn test_presence_status_lowercase() {
        let presence = PresenceUpdatePayload::new(PresenceStatus::Dnd);
        let json = serde_json::to_value(&presence).unwrap();
        assert_eq!(json["status"], "dnd");
        assert_eq!(json["since"], Value::Null);
        assert_eq!(json["afk"], false);
    }

    #[test]
    fn test_ready_payload_tolerates_extra_fields() {
        let ready: ReadyPayload = serde_json::from_value(serde_json::json!({
            "v": 10,
            "session_id": "d1c5",
            "resume_gateway_url": "wss://gateway-us-east1-c.discord.gg",
            "shard": [0, 1],
            "user": {"id": "1"},
            "guilds": [{"id": "2", "unavailable": true}],
            "application": {"id": "3"}
        }))
        .unwrap();

        assert_eq!(ready.session_id, "d1c5");
        assert_eq!(
            ready.resume_gateway_url.as_deref(),
            Some("wss://gateway-us-east1-c.discord.gg")
        );
        assert_eq!(ready.shard.map(|s| s.total()), Some(1));
        assert_eq!(ready.guilds.len(), 1);
    }

    #[test]
    fn test_ready_payload_minimal() {
        let ready: ReadyPayload =
            serde_json::from_value(serde_json::json!({"session_id": "s"})).unwrap();
        assert!(ready.resume_gateway_url.is_none());
        assert!(ready.shard.is_none());
    }
}
