//! Shard task
//!
//! Drives one shard through connect, Hello, Identify or Resume and Ready,
//! and back around after every disconnect until it is shut down or hits a
//! fatal close code.

use super::handle::{ShardCommand, ShardHandle};
use super::ShardConfig;
use crate::bucket::ShardBucket;
use crate::connection::{
    zombie_signal, Backoff, Connection, ConnectionState, SequenceCell, Session,
};
use crate::error::GatewayError;
use crate::events::{DispatchEvent, GatewayEvent, GatewayEventType, ShardEvent, ShardFailure};
use crate::protocol::{
    gateway_endpoint, CloseAction, CloseCode, GatewayMessage, HelloPayload, IdentifyPayload,
    ReadyPayload, ResumePayload,
};
use crate::ratelimit::{IdentifyPermit, IDENTIFY_WINDOW};
use crate::transport::{CloseFrame, Frame, Transport};
use rucord_core::{ShardId, ShardInfo};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, timeout_at, Instant};

/// Commands buffered per shard
const COMMAND_BUFFER_SIZE: usize = 64;

type PermitFuture = Pin<Box<dyn Future<Output = IdentifyPermit> + Send>>;

/// Plumbing shared by every shard of a manager
#[derive(Clone)]
pub struct ShardContext {
    pub config: Arc<ShardConfig>,
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::UnboundedSender<ShardEvent>,
    pub failures: mpsc::UnboundedSender<ShardFailure>,
}

/// How one connection ended
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown requested, do not reconnect
    Shutdown,
    /// Reconnect after backoff
    Reconnect {
        resume: bool,
        extra_delay: Duration,
        reason: GatewayError,
    },
    /// Stop for good
    Fatal(GatewayError),
}

impl SessionEnd {
    fn resume(reason: GatewayError) -> Self {
        Self::Reconnect {
            resume: true,
            extra_delay: Duration::ZERO,
            reason,
        }
    }

    fn reidentify(reason: GatewayError) -> Self {
        Self::Reconnect {
            resume: false,
            extra_delay: Duration::ZERO,
            reason,
        }
    }
}

/// State carried by one shard across connections
pub struct Shard {
    info: ShardInfo,
    bucket: Arc<ShardBucket>,
    ctx: ShardContext,
    session: Option<Session>,
    sequence: Arc<SequenceCell>,
    resumable: bool,
    backoff: Backoff,
    ready_since: Option<Instant>,
    commands: mpsc::Receiver<ShardCommand>,
    status: watch::Sender<ConnectionState>,
}

impl Shard {
    /// Start a shard task
    #[must_use]
    pub fn spawn(info: ShardInfo, bucket: Arc<ShardBucket>, ctx: ShardContext) -> ShardHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let bucket_id = bucket.id();

        let shard = Self {
            info,
            bucket,
            backoff: ctx.config.backoff(),
            ctx,
            session: None,
            sequence: Arc::new(SequenceCell::new()),
            resumable: false,
            ready_since: None,
            commands: command_rx,
            status: status_tx,
        };

        let task = tokio::spawn(shard.run());
        ShardHandle::new(info, bucket_id, command_tx, status_rx, task)
    }

    fn id(&self) -> ShardId {
        self.info.id()
    }

    async fn run(mut self) {
        tracing::info!(
            shard_id = self.id(),
            shard_count = self.info.total(),
            bucket_id = self.bucket.id(),
            "Shard starting"
        );

        loop {
            let end = self.run_connection().await;

            if let Some(ready_since) = self.ready_since.take() {
                if ready_since.elapsed() >= self.ctx.config.stable_after {
                    self.backoff.reset();
                }
            }

            match end {
                SessionEnd::Shutdown => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::info!(shard_id = self.id(), "Shard stopped");
                    return;
                }
                SessionEnd::Fatal(error) => {
                    self.fail(error);
                    return;
                }
                SessionEnd::Reconnect {
                    resume,
                    extra_delay,
                    reason,
                } => {
                    self.set_state(ConnectionState::Disconnected);
                    if resume {
                        self.resumable = true;
                    } else {
                        self.clear_session();
                    }

                    let Some(delay) = self.backoff.next_delay() else {
                        let attempts = self.backoff.attempts();
                        self.fail(GatewayError::RetriesExhausted {
                            shard_id: self.id(),
                            attempts,
                        });
                        return;
                    };
                    let delay = delay + extra_delay;

                    tracing::info!(
                        shard_id = self.id(),
                        reason = %reason,
                        resume = self.can_resume(),
                        attempt = self.backoff.attempts(),
                        delay = ?delay,
                        "Reconnecting"
                    );

                    if self.wait_or_shutdown(delay).await {
                        tracing::info!(shard_id = self.id(), "Shard stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One connection, from connect to close
    async fn run_connection(&mut self) -> SessionEnd {
        let resume = self.can_resume();
        let url = self.connect_url(resume);
        let deadline = Instant::now() + self.ctx.config.identify_timeout;

        self.set_state(ConnectionState::Connecting);
        tracing::debug!(shard_id = self.id(), url = %url, resume, "Connecting");

        let connected = {
            let connect = timeout_at(deadline, self.ctx.transport.connect(&url));
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break result,
                    command = self.commands.recv() => {
                        if is_shutdown(self.info.id(), command) {
                            return SessionEnd::Shutdown;
                        }
                    }
                }
            }
        };

        let socket = match connected {
            Ok(Ok(socket)) => socket,
            Ok(Err(error)) => {
                tracing::warn!(shard_id = self.id(), error = %error, "Failed to connect");
                return SessionEnd::Reconnect {
                    resume,
                    extra_delay: Duration::ZERO,
                    reason: error,
                };
            }
            Err(_) => {
                return SessionEnd::Reconnect {
                    resume,
                    extra_delay: Duration::ZERO,
                    reason: GatewayError::ConnectionLost("connect timed out".to_string()),
                };
            }
        };

        let mut conn = Connection::new(self.id(), socket);
        conn.set_resuming(resume);
        conn.set_handshake_deadline(Some(deadline));
        self.transition(&mut conn, ConnectionState::AwaitingHello);

        let mut permit: Option<PermitFuture> = None;

        loop {
            let ready = conn.state().is_ready();
            let handshake = conn.handshake_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ShardCommand::Send { message, reply }) => {
                        if !ready {
                            tracing::warn!(
                                shard_id = self.id(),
                                op = %message.op,
                                "Dropping command, shard is not ready"
                            );
                            let _ = reply.send(Err(GatewayError::ShardNotReady(self.id())));
                            continue;
                        }
                        if let Err(error) = conn.send_command(&message).await {
                            let _ = reply.send(Err(GatewayError::ShardNotReady(self.id())));
                            return self.lost(&mut conn, error).await;
                        }
                        let _ = reply.send(Ok(()));
                    }
                    Some(ShardCommand::Shutdown) | None => {
                        self.close(&mut conn, CloseFrame::normal()).await;
                        return SessionEnd::Shutdown;
                    }
                },

                () = zombie_signal(&mut conn.zombie) => {
                    self.transition(&mut conn, ConnectionState::Zombied);
                    self.close(&mut conn, CloseFrame::resumable("zombied connection")).await;
                    return SessionEnd::resume(GatewayError::ConnectionLost(
                        "heartbeat not acknowledged".to_string(),
                    ));
                }

                frame = conn.socket.inbound.recv() => match frame {
                    Some(Frame::Text(text)) => {
                        if let Some(end) = self.handle_text(&mut conn, &text, &mut permit).await {
                            return end;
                        }
                    }
                    Some(Frame::Close(close)) => return self.handle_close(&mut conn, close).await,
                    None => {
                        return self
                            .lost(&mut conn, GatewayError::ConnectionLost(
                                "connection dropped".to_string(),
                            ))
                            .await;
                    }
                },

                granted = next_permit(&mut permit), if permit.is_some() => {
                    permit = None;
                    if let Err(error) = self.identify(&mut conn, granted).await {
                        return self.lost(&mut conn, error).await;
                    }
                }

                () = handshake_timeout(handshake), if !ready => {
                    tracing::warn!(
                        shard_id = self.id(),
                        state = %conn.state(),
                        "Handshake timed out"
                    );
                    self.close(&mut conn, CloseFrame::resumable("handshake timed out")).await;
                    return SessionEnd::resume(GatewayError::ConnectionLost(
                        "handshake timed out".to_string(),
                    ));
                }
            }
        }
    }

    async fn handle_text(
        &mut self,
        conn: &mut Connection,
        text: &str,
        permit: &mut Option<PermitFuture>,
    ) -> Option<SessionEnd> {
        let event = match GatewayEvent::from_json(text) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(shard_id = self.id(), error = %error, "Ignoring undecodable frame");
                return None;
            }
        };

        match event {
            GatewayEvent::Hello(hello) => self.on_hello(conn, hello, permit).await,
            GatewayEvent::HeartbeatAck => {
                if let Some(latency) = conn.heartbeat().record_ack() {
                    tracing::trace!(
                        shard_id = self.id(),
                        latency = ?latency,
                        "Heartbeat acknowledged"
                    );
                }
                None
            }
            GatewayEvent::Heartbeat(_) => {
                tracing::debug!(shard_id = self.id(), "Gateway requested a heartbeat");
                let beat = GatewayMessage::heartbeat(self.sequence.get());
                match conn.send(&beat).await {
                    Ok(()) => None,
                    Err(error) => Some(self.lost(conn, error).await),
                }
            }
            GatewayEvent::Reconnect => {
                tracing::info!(shard_id = self.id(), "Gateway requested a reconnect");
                self.close(conn, CloseFrame::resumable("reconnect requested"))
                    .await;
                Some(SessionEnd::resume(GatewayError::ConnectionLost(
                    "reconnect requested".to_string(),
                )))
            }
            GatewayEvent::InvalidSession { resumable } => {
                Some(self.on_invalid_session(conn, resumable).await)
            }
            GatewayEvent::Dispatch(dispatch) => {
                self.on_dispatch(conn, dispatch);
                None
            }
            other => {
                tracing::debug!(shard_id = self.id(), op = %other.op(), "Ignoring unexpected op");
                None
            }
        }
    }

    async fn on_hello(
        &mut self,
        conn: &mut Connection,
        hello: HelloPayload,
        permit: &mut Option<PermitFuture>,
    ) -> Option<SessionEnd> {
        if conn.state() != ConnectionState::AwaitingHello {
            tracing::debug!(shard_id = self.id(), "Ignoring repeated Hello");
            return None;
        }

        let interval = Duration::from_millis(hello.heartbeat_interval);
        conn.start_heartbeat(interval, Arc::clone(&self.sequence));
        self.transition(conn, ConnectionState::Identifying);

        if conn.is_resuming() {
            if let Some(payload) = self.resume_payload() {
                tracing::info!(
                    shard_id = self.id(),
                    session_id = %payload.session_id,
                    seq = payload.seq,
                    "Resuming session"
                );
                if let Err(error) = conn.send(&GatewayMessage::resume(&payload)).await {
                    return Some(self.lost(conn, error).await);
                }
                conn.set_handshake_deadline(Some(
                    Instant::now() + self.ctx.config.identify_timeout,
                ));
                return None;
            }
            conn.set_resuming(false);
        }

        tracing::debug!(
            shard_id = self.id(),
            bucket_id = self.bucket.id(),
            "Waiting for identify slot"
        );
        // Queueing for a slot does not count against the handshake
        conn.set_handshake_deadline(None);
        let bucket = Arc::clone(&self.bucket);
        *permit = Some(Box::pin(async move { bucket.identify_slot().await }));
        None
    }

    async fn identify(
        &mut self,
        conn: &mut Connection,
        permit: IdentifyPermit,
    ) -> Result<(), GatewayError> {
        self.clear_session();

        let config = &self.ctx.config;
        let payload = IdentifyPayload {
            token: config.token.clone(),
            properties: config.properties.clone(),
            intents: config.intents,
            shard: Some(self.info),
            large_threshold: config.large_threshold,
            presence: config.presence.clone(),
        };

        tracing::info!(
            shard_id = self.id(),
            bucket_id = permit.bucket_id(),
            intents = %config.intents,
            "Identifying"
        );
        conn.send(&GatewayMessage::identify(&payload)).await?;
        conn.set_handshake_deadline(Some(Instant::now() + config.identify_timeout));
        Ok(())
    }

    async fn on_invalid_session(&mut self, conn: &mut Connection, resumable: bool) -> SessionEnd {
        if resumable && self.session.is_some() {
            tracing::info!(shard_id = self.id(), "Session invalidated, resuming");
            self.close(conn, CloseFrame::resumable("invalid session")).await;
            SessionEnd::resume(GatewayError::SessionInvalidated)
        } else {
            tracing::warn!(shard_id = self.id(), "Session invalidated, identifying again");
            self.clear_session();
            self.close(conn, CloseFrame::normal()).await;
            SessionEnd::reidentify(GatewayError::SessionInvalidated)
        }
    }

    fn on_dispatch(&mut self, conn: &mut Connection, dispatch: DispatchEvent) {
        if !self.sequence.advance(dispatch.sequence) {
            tracing::debug!(
                shard_id = self.id(),
                seq = dispatch.sequence,
                current = ?self.sequence.get(),
                event = %dispatch.name,
                "Skipping stale dispatch"
            );
            return;
        }

        match dispatch.kind() {
            Some(GatewayEventType::Ready) => {
                match serde_json::from_value::<ReadyPayload>(dispatch.data.clone()) {
                    Ok(ready) => {
                        let session = Session::from(&ready);
                        tracing::info!(
                            shard_id = self.id(),
                            session_id = %session.id,
                            guilds = ready.guilds.len(),
                            "Shard ready"
                        );
                        self.session = Some(session);
                        self.resumable = true;
                        self.mark_ready(conn);
                    }
                    Err(error) => {
                        tracing::warn!(
                            shard_id = self.id(),
                            error = %error,
                            "READY without a usable session"
                        );
                    }
                }
            }
            Some(GatewayEventType::Resumed) => {
                tracing::info!(shard_id = self.id(), "Session resumed");
                conn.set_resuming(false);
                self.mark_ready(conn);
            }
            _ => {}
        }

        let event = ShardEvent::new(self.id(), GatewayEvent::Dispatch(dispatch));
        if self.ctx.events.send(event).is_err() {
            tracing::trace!(shard_id = self.id(), "Event stream dropped");
        }
    }

    async fn handle_close(
        &mut self,
        conn: &mut Connection,
        close: Option<CloseFrame>,
    ) -> SessionEnd {
        let interval = conn.heartbeat_interval();
        conn.stop_heartbeat().await;

        let code = close.as_ref().map(|c| c.code);
        tracing::info!(
            shard_id = self.id(),
            code = ?code,
            reason = close.as_ref().map_or("", |c| c.reason.as_str()),
            "Gateway closed the connection"
        );

        let reason = || match code {
            Some(code) => GatewayError::ConnectionLost(format!("closed with code {code}")),
            None => GatewayError::ConnectionLost("closed without a code".to_string()),
        };

        match CloseCode::classify(code) {
            CloseAction::Resume => {
                let rate_limited = code == Some(CloseCode::RateLimited.as_u16());
                if rate_limited {
                    tracing::error!(
                        shard_id = self.id(),
                        "Gateway closed with RateLimited, commands are being sent too fast"
                    );
                }
                SessionEnd::Reconnect {
                    resume: true,
                    extra_delay: if rate_limited {
                        interval.unwrap_or(IDENTIFY_WINDOW)
                    } else {
                        Duration::ZERO
                    },
                    reason: if rate_limited {
                        GatewayError::RateLimited
                    } else {
                        reason()
                    },
                }
            }
            CloseAction::Reidentify => SessionEnd::reidentify(
                code.and_then(CloseCode::from_u16)
                    .map_or_else(reason, GatewayError::from_close_code),
            ),
            CloseAction::Fatal => SessionEnd::Fatal(
                code.and_then(CloseCode::from_u16)
                    .map_or_else(reason, GatewayError::from_close_code),
            ),
        }
    }

    /// Connection lost without a close frame
    async fn lost(&mut self, conn: &mut Connection, error: GatewayError) -> SessionEnd {
        tracing::warn!(shard_id = self.id(), error = %error, "Connection lost");
        conn.stop_heartbeat().await;
        SessionEnd::resume(error)
    }

    async fn close(&self, conn: &mut Connection, frame: CloseFrame) {
        self.set_state(ConnectionState::Closing);
        conn.close(frame).await;
    }

    /// Sleep out the backoff, returning `true` if shutdown was requested
    async fn wait_or_shutdown(&mut self, delay: Duration) -> bool {
        let delay = sleep(delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                () = &mut delay => return false,
                command = self.commands.recv() => {
                    if is_shutdown(self.info.id(), command) {
                        return true;
                    }
                }
            }
        }
    }

    fn fail(&self, error: GatewayError) {
        tracing::error!(
            shard_id = self.id(),
            code = error.code(),
            error = %error,
            "Shard failed"
        );
        self.set_state(ConnectionState::Failed);
        let _ = self.ctx.failures.send(ShardFailure {
            shard_id: self.id(),
            error,
        });
    }

    fn can_resume(&self) -> bool {
        self.resumable && self.resume_payload().is_some()
    }

    fn resume_payload(&self) -> Option<ResumePayload> {
        let session = self.session.as_ref()?;
        let seq = self.sequence.get()?;
        Some(ResumePayload {
            token: self.ctx.config.token.clone(),
            session_id: session.id.clone(),
            seq,
        })
    }

    fn clear_session(&mut self) {
        self.session = None;
        self.sequence.reset();
        self.resumable = false;
    }

    fn connect_url(&self, resume: bool) -> String {
        let default_url = self.ctx.config.gateway_url.as_str();
        let base = match (&self.session, resume) {
            (Some(session), true) => session.resume_url_or(default_url),
            _ => default_url,
        };
        gateway_endpoint(base)
    }

    fn mark_ready(&mut self, conn: &mut Connection) {
        conn.mark_ready();
        self.ready_since = conn.ready_at();
        self.set_state(ConnectionState::Ready);
    }

    fn transition(&self, conn: &mut Connection, state: ConnectionState) {
        conn.set_state(state);
        self.set_state(state);
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

/// Handle a command that arrived while no session is open
fn is_shutdown(shard_id: ShardId, command: Option<ShardCommand>) -> bool {
    match command {
        Some(ShardCommand::Send { message, reply }) => {
            tracing::warn!(shard_id, op = %message.op, "Dropping command, shard is not connected");
            let _ = reply.send(Err(GatewayError::ShardNotReady(shard_id)));
            false
        }
        Some(ShardCommand::Shutdown) | None => true,
    }
}

/// Resolves at the handshake deadline, never while none is set
async fn handshake_timeout(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves with the pending identify permit
async fn next_permit(permit: &mut Option<PermitFuture>) -> IdentifyPermit {
    match permit.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}
