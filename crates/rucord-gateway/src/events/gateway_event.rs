//! Typed gateway events

use super::GatewayEventType;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{GatewayMessage, HelloPayload, OpCode};
use serde_json::Value;

/// A dispatch (op 0) event
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    /// Event name from the `t` field
    pub name: String,
    /// Sequence number from the `s` field
    pub sequence: u64,
    /// Event data, forwarded untouched
    pub data: Value,
}

impl DispatchEvent {
    /// Known event kind, `None` for names this crate does not list
    #[must_use]
    pub fn kind(&self) -> Option<GatewayEventType> {
        GatewayEventType::parse(&self.name)
    }

    /// Check the event name
    #[must_use]
    pub fn is(&self, kind: GatewayEventType) -> bool {
        self.name == kind.as_str()
    }
}

/// One decoded gateway message, tagged by op code
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Dispatch(DispatchEvent),
    /// Heartbeat with the last sequence, or a server request for one
    Heartbeat(Option<u64>),
    Identify(Value),
    PresenceUpdate(Value),
    Resume(Value),
    Reconnect,
    RequestGuildMembers(Value),
    InvalidSession { resumable: bool },
    Hello(HelloPayload),
    HeartbeatAck,
}

impl GatewayEvent {
    /// Op code of this event
    #[must_use]
    pub const fn op(&self) -> OpCode {
        match self {
            Self::Dispatch(_) => OpCode::Dispatch,
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::Identify(_) => OpCode::Identify,
            Self::PresenceUpdate(_) => OpCode::PresenceUpdate,
            Self::Resume(_) => OpCode::Resume,
            Self::Reconnect => OpCode::Reconnect,
            Self::RequestGuildMembers(_) => OpCode::RequestGuildMembers,
            Self::InvalidSession { .. } => OpCode::InvalidSession,
            Self::Hello(_) => OpCode::Hello,
            Self::HeartbeatAck => OpCode::HeartbeatAck,
        }
    }

    /// Decode a gateway message
    pub fn from_message(message: GatewayMessage) -> GatewayResult<Self> {
        let event = match message.op {
            OpCode::Dispatch => {
                let (Some(name), Some(sequence)) = (message.t, message.s) else {
                    return Err(GatewayError::InvalidPayload(
                        "dispatch without event name or sequence".to_string(),
                    ));
                };
                Self::Dispatch(DispatchEvent {
                    name,
                    sequence,
                    data: message.d,
                })
            }
            OpCode::Heartbeat => Self::Heartbeat(message.d.as_u64()),
            OpCode::Identify => Self::Identify(message.d),
            OpCode::PresenceUpdate => Self::PresenceUpdate(message.d),
            OpCode::Resume => Self::Resume(message.d),
            OpCode::Reconnect => Self::Reconnect,
            OpCode::RequestGuildMembers => Self::RequestGuildMembers(message.d),
            OpCode::InvalidSession => Self::InvalidSession {
                resumable: message.d.as_bool().unwrap_or(false),
            },
            OpCode::Hello => Self::Hello(serde_json::from_value(message.d)?),
            OpCode::HeartbeatAck => Self::HeartbeatAck,
        };
        Ok(event)
    }

    /// Decode a JSON text frame
    pub fn from_json(text: &str) -> GatewayResult<Self> {
        Self::from_message(GatewayMessage::from_json(text)?)
    }

    /// Dispatch payload, if this is a dispatch
    #[must_use]
    pub fn as_dispatch(&self) -> Option<&DispatchEvent> {
        match self {
            Self::Dispatch(dispatch) => Some(dispatch),
            _ => None,
        }
    }
}

impl From<GatewayEvent> for GatewayMessage {
    fn from(event: GatewayEvent) -> Self {
        let op = event.op();
        match event {
            GatewayEvent::Dispatch(dispatch) => {
                Self::dispatch(dispatch.name, dispatch.sequence, dispatch.data)
            }
            GatewayEvent::Heartbeat(seq) => Self::heartbeat(seq),
            GatewayEvent::Reconnect => Self::reconnect(),
            GatewayEvent::InvalidSession { resumable } => Self::invalid_session(resumable),
            GatewayEvent::Hello(hello) => Self::hello(hello),
            GatewayEvent::HeartbeatAck => Self::heartbeat_ack(),
            GatewayEvent::Identify(d)
            | GatewayEvent::PresenceUpdate(d)
            | GatewayEvent::Resume(d)
            | GatewayEvent::RequestGuildMembers(d) => Self {
                op,
                t: None,
                s: None,
                d,
            },
        }
    }
}
