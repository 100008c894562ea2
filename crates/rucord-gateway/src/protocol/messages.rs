//! Gateway message format
//!
//! Every frame exchanged with the gateway is a JSON object of this shape.

use super::{
    HelloPayload, IdentifyPayload, OpCode, PresenceUpdatePayload, ReadyPayload, ResumePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event name (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload, `null` when absent
    #[serde(default)]
    pub d: Value,
}

impl GatewayMessage {
    fn new(op: OpCode, d: Value) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    // === Client Messages ===

    /// Create a Heartbeat message (op=1) carrying the last sequence number
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(
            OpCode::Heartbeat,
            last_sequence.map_or(Value::Null, |s| Value::Number(s.into())),
        )
    }

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::new(
            OpCode::Identify,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Presence Update message (op=3)
    #[must_use]
    pub fn presence_update(payload: &PresenceUpdatePayload) -> Self {
        Self::new(
            OpCode::PresenceUpdate,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::new(
            OpCode::Resume,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Request Guild Members message (op=8)
    #[must_use]
    pub fn request_guild_members(data: Value) -> Self {
        Self::new(OpCode::RequestGuildMembers, data)
    }

    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: data,
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(payload: HelloPayload) -> Self {
        Self::new(
            OpCode::Hello,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Heartbeat ACK message (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, Value::Null)
    }

    /// Create a Reconnect message (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, Value::Null)
    }

    /// Create an Invalid Session message (op=9)
    ///
    /// `resumable` indicates if the session can be resumed.
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Value::Bool(resumable))
    }

    // === Parsing ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.parse_as(OpCode::Hello)
    }

    /// Try to parse as an Identify payload (op=2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.parse_as(OpCode::Identify)
    }

    /// Try to parse as a Resume payload (op=6)
    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.parse_as(OpCode::Resume)
    }

    /// Try to parse as a Presence Update payload (op=3)
    pub fn as_presence_update(&self) -> Option<PresenceUpdatePayload> {
        self.parse_as(OpCode::PresenceUpdate)
    }

    /// Try to parse as the READY dispatch
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        if self.op != OpCode::Dispatch || self.t.as_deref() != Some("READY") {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    /// Try to parse the heartbeat sequence number (op=1)
    pub fn as_heartbeat_seq(&self) -> Option<Option<u64>> {
        if self.op != OpCode::Heartbeat {
            return None;
        }
        Some(self.d.as_u64())
    }

    /// Try to parse the resumable flag of an Invalid Session (op=9)
    ///
    /// A missing flag means the session cannot be resumed.
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_bool().unwrap_or(false))
    }

    fn parse_as<T: serde::de::DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{IdentifyProperties, PresenceStatus};
    use rucord_core::GatewayIntents;

    #[test]
    fn test_heartbeat_serializes_null_without_sequence() {
        let json = GatewayMessage::heartbeat(None).to_json().unwrap();
        assert_eq!(json, r#"{"op":1,"d":null}"#);

        let json = GatewayMessage::heartbeat(Some(251)).to_json().unwrap();
        assert_eq!(json, r#"{"op":1,"d":251}"#);
    }

    #[test]
    fn test_parse_hello() {
        let msg = GatewayMessage::from_json(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#)
            .unwrap();
        assert_eq!(msg.as_hello(), Some(HelloPayload::with_interval(41_250)));
        assert!(msg.as_invalid_session().is_none());
    }

    #[test]
    fn test_parse_dispatch_with_null_fields() {
        let msg = GatewayMessage::from_json(
            r#"{"op":0,"t":"MESSAGE_CREATE","s":42,"d":{"content":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(msg.op, OpCode::Dispatch);
        assert_eq!(msg.t.as_deref(), Some("MESSAGE_CREATE"));
        assert_eq!(msg.s, Some(42));

        let ack = GatewayMessage::from_json(r#"{"op":11,"t":null,"s":null,"d":null}"#).unwrap();
        assert_eq!(ack, GatewayMessage::heartbeat_ack());
    }

    #[test]
    fn test_invalid_session_flag() {
        assert_eq!(
            GatewayMessage::invalid_session(true).as_invalid_session(),
            Some(true)
        );
        let bare = GatewayMessage::from_json(r#"{"op":9}"#).unwrap();
        assert_eq!(bare.as_invalid_session(), Some(false));
    }

    #[test]
    fn test_identify_message() {
        let payload = IdentifyPayload {
            token: "token".to_string(),
            properties: IdentifyProperties::default(),
            intents: GatewayIntents::GUILDS,
            shard: None,
            large_threshold: Some(250),
            presence: Some(PresenceUpdatePayload::new(PresenceStatus::Idle)),
        };
        let msg = GatewayMessage::identify(&payload);
        assert_eq!(msg.op, OpCode::Identify);

        let parsed = msg.as_identify().unwrap();
        assert_eq!(parsed.token, "token");
        assert_eq!(parsed.large_threshold, Some(250));
        assert_eq!(parsed.presence.map(|p| p.status), Some(PresenceStatus::Idle));
    }

    #[test]
    fn test_as_ready_requires_ready_dispatch() {
        let ready = GatewayMessage::dispatch(
            "READY",
            1,
            serde_json::json!({"session_id": "abc", "resume_gateway_url": "wss://r"}),
        );
        assert_eq!(ready.as_ready().unwrap().session_id, "abc");

        let other = GatewayMessage::dispatch("RESUMED", 2, serde_json::json!({"session_id": "abc"}));
        assert!(other.as_ready().is_none());
    }

    #[test]
    fn test_display() {
        let msg = GatewayMessage::dispatch("GUILD_CREATE", 3, Value::Null);
        assert_eq!(
            msg.to_string(),
            "GatewayMessage(op=Dispatch (0), t=GUILD_CREATE, s=3)"
        );
        assert_eq!(
            GatewayMessage::heartbeat_ack().to_string(),
            "GatewayMessage(op=HeartbeatAck (11))"
        );
    }
}
