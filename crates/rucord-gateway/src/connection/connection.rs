//! A single gateway connection
//!
//! Owned by the shard task for as long as the WebSocket is open. Dropping it
//! stops the heartbeat and the socket reader.

use super::{ConnectionState, SequenceCell};
use crate::error::{GatewayError, GatewayResult};
use crate::heartbeat::{first_beat_delay, HeartbeatDriver, HeartbeatState};
use crate::protocol::GatewayMessage;
use crate::ratelimit::CommandRateLimiter;
use crate::transport::{CloseFrame, Frame, Socket};
use rucord_core::ShardId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// One open WebSocket connection of a shard
#[derive(Debug)]
pub struct Connection {
    shard_id: ShardId,
    pub(crate) socket: Socket,
    state: ConnectionState,
    heartbeat: Arc<HeartbeatState>,
    driver: Option<HeartbeatDriver>,
    pub(crate) zombie: Option<oneshot::Receiver<()>>,
    commands: CommandRateLimiter,
    resuming: bool,
    opened_at: Instant,
    ready_at: Option<Instant>,
    handshake_deadline: Option<Instant>,
}

impl Connection {
    /// Wrap a freshly opened socket
    #[must_use]
    pub fn new(shard_id: ShardId, socket: Socket) -> Self {
        Self {
            shard_id,
            socket,
            state: ConnectionState::AwaitingHello,
            heartbeat: Arc::new(HeartbeatState::new()),
            driver: None,
            zombie: None,
            commands: CommandRateLimiter::new(),
            resuming: false,
            opened_at: Instant::now(),
            ready_at: None,
            handshake_deadline: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::trace!(
                shard_id = self.shard_id,
                from = %self.state,
                to = %state,
                "Connection state changed"
            );
            self.state = state;
        }
    }

    /// Heartbeat bookkeeping
    #[must_use]
    pub fn heartbeat(&self) -> &Arc<HeartbeatState> {
        &self.heartbeat
    }

    /// Interval announced in Hello, once heartbeating started
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.driver.as_ref().map(HeartbeatDriver::interval)
    }

    #[must_use]
    pub fn last_heartbeat_sent(&self) -> Option<Instant> {
        self.heartbeat.last_sent()
    }

    #[must_use]
    pub fn last_ack_received(&self) -> Option<Instant> {
        self.heartbeat.last_ack()
    }

    /// Check if this connection is resuming rather than identifying
    #[must_use]
    pub const fn is_resuming(&self) -> bool {
        self.resuming
    }

    pub fn set_resuming(&mut self, resuming: bool) {
        self.resuming = resuming;
    }

    #[must_use]
    pub const fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// When READY or RESUMED arrived
    #[must_use]
    pub const fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    /// When an unfinished handshake gives up, `None` while not timed
    #[must_use]
    pub const fn handshake_deadline(&self) -> Option<Instant> {
        self.handshake_deadline
    }

    pub fn set_handshake_deadline(&mut self, deadline: Option<Instant>) {
        self.handshake_deadline = deadline;
    }

    /// Enter `Ready`
    pub fn mark_ready(&mut self) {
        self.ready_at = Some(Instant::now());
        self.handshake_deadline = None;
        self.set_state(ConnectionState::Ready);
    }

    /// Start heartbeating at the interval from Hello
    ///
    /// A running driver is replaced.
    pub fn start_heartbeat(&mut self, interval: Duration, sequence: Arc<SequenceCell>) {
        let (driver, zombie) = HeartbeatDriver::spawn(
            self.shard_id,
            interval,
            first_beat_delay(interval),
            self.socket.outbound.clone(),
            Arc::clone(&self.heartbeat),
            sequence,
        );
        self.driver = Some(driver);
        self.zombie = Some(zombie);
    }

    /// Send a gateway message
    pub async fn send(&self, message: &GatewayMessage) -> GatewayResult<()> {
        let frame = Frame::message(message)?;
        if self.socket.send(frame).await {
            tracing::trace!(shard_id = self.shard_id, op = %message.op, "Sent");
            Ok(())
        } else {
            Err(GatewayError::ConnectionLost("socket closed".to_string()))
        }
    }

    /// Send a caller command within the per-connection budget
    pub async fn send_command(&self, message: &GatewayMessage) -> GatewayResult<()> {
        self.commands.until_ready().await;
        self.send(message).await
    }

    /// Stop heartbeating without closing
    pub async fn stop_heartbeat(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.stop().await;
        }
        self.zombie = None;
    }

    /// Stop heartbeating, then send a close frame
    pub async fn close(&mut self, frame: CloseFrame) {
        self.stop_heartbeat().await;
        self.set_state(ConnectionState::Closing);

        tracing::debug!(
            shard_id = self.shard_id,
            code = frame.code,
            reason = %frame.reason,
            "Closing connection"
        );
        let _ = self.socket.send(Frame::Close(Some(frame))).await;
    }
}

/// Resolves when the heartbeat driver reports a zombied connection
///
/// Pending forever when no driver runs or the driver exited for another
/// reason.
pub(crate) async fn zombie_signal(zombie: &mut Option<oneshot::Receiver<()>>) {
    if let Some(rx) = zombie.as_mut() {
        if rx.await.is_ok() {
            *zombie = None;
            return;
        }
        *zombie = None;
    }
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use crate::transport::{MemoryTransport, Transport};

    async fn open() -> (Connection, crate::transport::MemoryPeer) {
        let (transport, mut listener) = MemoryTransport::new();
        let socket = transport.connect("ws://memory").await.unwrap();
        let peer = listener.accept().await.unwrap();
        (Connection::new(0, socket), peer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_heartbeat_before_close_frame() {
        let (mut conn, mut peer) = open().await;
        conn.start_heartbeat(Duration::from_millis(100), Arc::new(SequenceCell::new()));
        assert_eq!(conn.heartbeat_interval(), Some(Duration::from_millis(100)));

        let first = peer.recv_message().await.unwrap();
        assert_eq!(first.op, OpCode::Heartbeat);
        conn.heartbeat().record_ack();

        conn.close(CloseFrame::normal()).await;
        assert_eq!(conn.state(), ConnectionState::Closing);
        drop(conn);

        // Anything queued before the close is still delivered, nothing after it
        let mut frames = Vec::new();
        while let Some(frame) = peer.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.last(), Some(&Frame::Close(Some(CloseFrame::normal()))));
        assert_eq!(
            frames.iter().filter(|f| matches!(f, Frame::Close(_))).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_peer_gone_is_connection_lost() {
        let (conn, peer) = open().await;
        drop(peer);
        let result = conn.send(&GatewayMessage::heartbeat(None)).await;
        assert!(matches!(result, Err(GatewayError::ConnectionLost(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zombie_signal_fires_on_missed_ack() {
        let (mut conn, mut peer) = open().await;
        conn.start_heartbeat(Duration::from_secs(1), Arc::new(SequenceCell::new()));
        peer.recv_message().await.unwrap();

        zombie_signal(&mut conn.zombie).await;
        assert!(conn.zombie.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_ready() {
        let (mut conn, _peer) = open().await;
        assert_eq!(conn.state(), ConnectionState::AwaitingHello);
        conn.mark_ready();
        assert!(conn.state().is_ready());
        assert!(conn.ready_at().is_some());
    }
}
