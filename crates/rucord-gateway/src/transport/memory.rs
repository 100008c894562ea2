//! In-process transport
//!
//! Each `connect` hands the server half of a channel pair to a
//! [`MemoryListener`], which plays the gateway. Used to simulate gateways in
//! tests without a network.

use super::{CloseFrame, Frame, Socket, Transport, FRAME_BUFFER_SIZE};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::GatewayMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Client side of the in-process transport
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    acceptor: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryTransport {
    /// Create a transport and the listener receiving its connections
    #[must_use]
    pub fn new() -> (Self, MemoryListener) {
        let (acceptor, incoming) = mpsc::unbounded_channel();
        (Self { acceptor }, MemoryListener { incoming })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> GatewayResult<Socket> {
        let (to_server, from_client) = mpsc::channel(FRAME_BUFFER_SIZE);
        let (to_client, from_server) = mpsc::channel(FRAME_BUFFER_SIZE);

        let peer = MemoryPeer {
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.acceptor
            .send(peer)
            .map_err(|_| GatewayError::Transport("connection refused".to_string()))?;

        Ok(Socket::new(to_server, from_server))
    }
}

/// Accepts in-process connections
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Take a pending connection without waiting
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }
}

/// Server half of one in-process connection
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    to_client: mpsc::Sender<Frame>,
    from_client: mpsc::Receiver<Frame>,
}

impl MemoryPeer {
    /// URL the client connected to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a gateway message to the client
    pub async fn send(&self, message: &GatewayMessage) -> bool {
        match Frame::message(message) {
            Ok(frame) => self.to_client.send(frame).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Send a raw text frame to the client
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Frame::Text(text.into())).await.is_ok()
    }

    /// Close the connection with a code
    pub async fn close(self, code: u16) {
        let _ = self
            .to_client
            .send(Frame::Close(Some(CloseFrame::new(code, ""))))
            .await;
    }

    /// Next frame from the client, `None` once the client dropped the socket
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next gateway message from the client, `None` on close or disconnect
    pub async fn recv_message(&mut self) -> Option<GatewayMessage> {
        match self.recv().await? {
            Frame::Text(text) => GatewayMessage::from_json(&text).ok(),
            Frame::Close(_) => None,
        }
    }

    /// Drop the connection without a close frame
    pub fn disconnect(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut listener) = MemoryTransport::new();
        let mut socket = transport.connect("ws://memory").await.unwrap();
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.url(), "ws://memory");

        assert!(peer.send(&GatewayMessage::heartbeat_ack()).await);
        let frame = socket.recv().await.unwrap();
        assert_eq!(frame, Frame::message(&GatewayMessage::heartbeat_ack()).unwrap());

        assert!(socket.send(Frame::message(&GatewayMessage::heartbeat(Some(1))).unwrap()).await);
        let message = peer.recv_message().await.unwrap();
        assert_eq!(message.op, OpCode::Heartbeat);
    }

    #[tokio::test]
    async fn test_disconnect_ends_inbound() {
        let (transport, mut listener) = MemoryTransport::new();
        let mut socket = transport.connect("ws://memory").await.unwrap();
        listener.accept().await.unwrap().disconnect();
        assert_eq!(socket.recv().await, None);
    }

    #[tokio::test]
    async fn test_connect_fails_without_listener() {
        let (transport, listener) = MemoryTransport::new();
        drop(listener);
        assert!(matches!(
            transport.connect("ws://memory").await,
            Err(GatewayError::Transport(_))
        ));
    }
}
