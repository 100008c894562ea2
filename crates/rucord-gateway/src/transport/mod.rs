//! WebSocket transport
//!
//! A shard never touches a WebSocket directly. It talks to a [`Socket`], a
//! pair of frame channels, and a [`Transport`] knows how to open one.

mod memory;
mod tungstenite;

pub use memory::{MemoryListener, MemoryPeer, MemoryTransport};
pub use tungstenite::TungsteniteTransport;

use crate::error::GatewayResult;
use crate::protocol::{CloseCode, GatewayMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Frames buffered per direction
pub const FRAME_BUFFER_SIZE: usize = 128;

/// Close code and reason of a close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure, which ends the session on the gateway side
    #[must_use]
    pub fn normal() -> Self {
        Self::new(CloseCode::NORMAL, "shutdown")
    }

    /// Non-1000 closure, which keeps the session resumable
    #[must_use]
    pub fn resumable(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::UnknownError.as_u16(), reason)
    }
}

/// A WebSocket frame as seen by a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON text frame
    Text(String),
    /// Close frame, `None` when the peer sent no code
    Close(Option<CloseFrame>),
}

impl Frame {
    /// Serialize a gateway message into a text frame
    pub fn message(message: &GatewayMessage) -> GatewayResult<Self> {
        Ok(Self::Text(message.to_json()?))
    }
}

/// An open connection
///
/// `inbound` ends when the connection is gone. Dropping the socket stops the
/// reader side. The writer side drains whatever was already queued on
/// `outbound`, so a close frame sent right before dropping still goes out.
#[derive(Debug)]
pub struct Socket {
    pub(crate) outbound: mpsc::Sender<Frame>,
    pub(crate) inbound: mpsc::Receiver<Frame>,
    reader: Option<AbortHandle>,
}

impl Socket {
    #[must_use]
    pub fn new(outbound: mpsc::Sender<Frame>, inbound: mpsc::Receiver<Frame>) -> Self {
        Self {
            outbound,
            inbound,
            reader: None,
        }
    }

    /// Tie a background reader task to the socket's lifetime
    #[must_use]
    pub fn with_reader(mut self, reader: AbortHandle) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Queue a frame for sending
    pub async fn send(&self, frame: Frame) -> bool {
        self.outbound.send(frame).await.is_ok()
    }

    /// Next inbound frame, `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Opens gateway connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connect to a gateway URL
    async fn connect(&self, url: &str) -> GatewayResult<Socket>;
}
