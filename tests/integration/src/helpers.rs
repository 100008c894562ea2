//! Test helpers for integration tests
//!
//! Provides a mock gateway server that speaks the gateway protocol over a real
//! WebSocket and serves `/gateway/bot`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use rucord_gateway::protocol::{GatewayMessage, HelloPayload, OpCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Behaviour of a [`MockGateway`]
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Interval announced in Hello, in milliseconds
    pub heartbeat_interval: u64,
    /// Shard count recommended by `/gateway/bot`
    pub recommended_shards: u32,
    /// Session starts remaining
    pub remaining: u32,
    pub max_concurrency: u32,
    /// Close the first connection with this code right after READY
    pub close_first_session: Option<u16>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: 1_000,
            recommended_shards: 1,
            remaining: 1_000,
            max_concurrency: 1,
            close_first_session: None,
        }
    }
}

/// Something the mock gateway received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Identify { shard: [u32; 2] },
    Resume { session_id: String, seq: u64 },
    Heartbeat,
    Close(Option<u16>),
}

struct MockState {
    options: MockOptions,
    ws_url: String,
    connections: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
    bot_requests: Mutex<Vec<Option<String>>>,
}

impl MockState {
    fn record(&self, seen: Seen) {
        self.seen.lock().push(seen);
    }
}

/// Mock gateway instance that manages its server task
pub struct MockGateway {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a mock gateway with default options
    pub async fn start() -> Result<Self> {
        Self::start_with(MockOptions::default()).await
    }

    /// Start a mock gateway on an ephemeral port
    pub async fn start_with(options: MockOptions) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            options,
            ws_url: format!("ws://{addr}"),
            connections: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            bot_requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", get(gateway))
            .route("/api/v10/gateway/bot", get(gateway_bot))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// WebSocket URL of the gateway
    pub fn ws_url(&self) -> String {
        self.state.ws_url.clone()
    }

    /// REST base URL, as `DISCORD_API_BASE` would be set
    pub fn api_base(&self) -> String {
        format!("http://{}/api/v10", self.addr)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.state.seen.lock().clone()
    }

    /// Shard ids in the order they identified
    pub fn identified_shards(&self) -> Vec<u32> {
        self.seen()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Identify { shard } => Some(shard[0]),
                _ => None,
            })
            .collect()
    }

    pub fn heartbeats(&self) -> usize {
        self.seen()
            .iter()
            .filter(|seen| **seen == Seen::Heartbeat)
            .count()
    }

    /// WebSocket connections accepted so far
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// `Authorization` header of every `/gateway/bot` request
    pub fn bot_requests(&self) -> Vec<Option<String>> {
        self.state.bot_requests.lock().clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn gateway_bot(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.bot_requests.lock().push(authorization);

    let options = &state.options;
    Json(json!({
        "url": state.ws_url,
        "shards": options.recommended_shards,
        "session_start_limit": {
            "total": 1000,
            "remaining": options.remaining,
            "reset_after": 60_000,
            "max_concurrency": options.max_concurrency,
        }
    }))
}

async fn gateway(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn send(socket: &mut WebSocket, message: &GatewayMessage) -> Result<()> {
    socket.send(Message::Text(message.to_json()?)).await?;
    Ok(())
}

async fn serve(mut socket: WebSocket, state: Arc<MockState>) {
    let connection = state.connections.fetch_add(1, Ordering::SeqCst);
    let hello = GatewayMessage::hello(HelloPayload::with_interval(
        state.options.heartbeat_interval,
    ));
    if send(&mut socket, &hello).await.is_err() {
        return;
    }

    while let Some(Ok(frame)) = socket.recv().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(close) => {
                state.record(Seen::Close(close.map(|c| c.code)));
                return;
            }
            _ => continue,
        };
        let Ok(message) = GatewayMessage::from_json(&text) else {
            continue;
        };

        let reply = match message.op {
            OpCode::Heartbeat => {
                state.record(Seen::Heartbeat);
                GatewayMessage::heartbeat_ack()
            }
            OpCode::Identify => {
                let Some(identify) = message.as_identify() else {
                    continue;
                };
                let shard = identify
                    .shard
                    .map_or([0, 1], |info| [info.id(), info.total()]);
                state.record(Seen::Identify { shard });

                GatewayMessage::dispatch(
                    "READY",
                    1,
                    json!({
                        "v": 10,
                        "session_id": format!("mock-session-{}", shard[0]),
                        "resume_gateway_url": state.ws_url,
                        "shard": shard,
                        "user": { "id": "1", "username": "mock" },
                        "guilds": [],
                    }),
                )
            }
            OpCode::Resume => {
                let Some(resume) = message.as_resume() else {
                    continue;
                };
                let seq = resume.seq + 1;
                state.record(Seen::Resume {
                    session_id: resume.session_id,
                    seq: resume.seq,
                });
                GatewayMessage::dispatch("RESUMED", seq, json!({}))
            }
            _ => continue,
        };

        if send(&mut socket, &reply).await.is_err() {
            return;
        }

        if message.op == OpCode::Identify && connection == 0 {
            if let Some(code) = state.options.close_first_session {
                let close = CloseFrame {
                    code,
                    reason: "mock close".into(),
                };
                let _ = socket.send(Message::Close(Some(close))).await;
                return;
            }
        }
    }
}
