//! Simulated gateway for unit tests

use crate::bucket::ShardBucket;
use crate::events::{ShardEvent, ShardFailure};
use crate::protocol::{GatewayMessage, HelloPayload, OpCode};
use crate::ratelimit::IdentifyRateLimiter;
use crate::shard::{Shard, ShardConfig, ShardContext, ShardHandle};
use crate::transport::{MemoryListener, MemoryPeer, MemoryTransport};
use parking_lot::Mutex;
use rucord_core::{GatewayIntents, ShardId, ShardInfo};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const TEST_GATEWAY: &str = "ws://gateway.test";
pub const RESUME_GATEWAY: &str = "ws://resume.test";
pub const TEST_TOKEN: &str = "test-token";
pub const HEARTBEAT_INTERVAL: u64 = 41_250;

pub fn test_config() -> ShardConfig {
    ShardConfig::new(TEST_TOKEN)
        .with_gateway_url(TEST_GATEWAY)
        .with_intents(GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES)
}

/// A single shard wired to an in-process gateway
pub struct ShardHarness {
    pub handle: ShardHandle,
    pub listener: MemoryListener,
    pub events: mpsc::UnboundedReceiver<ShardEvent>,
    pub failures: mpsc::UnboundedReceiver<ShardFailure>,
}

pub fn spawn_shard(config: ShardConfig) -> ShardHarness {
    let (transport, listener) = MemoryTransport::new();
    let (events_tx, events) = mpsc::unbounded_channel();
    let (failures_tx, failures) = mpsc::unbounded_channel();

    let limiter = Arc::new(IdentifyRateLimiter::new());
    let bucket = Arc::new(ShardBucket::new(0, vec![0], limiter));
    let ctx = ShardContext {
        config: Arc::new(config),
        transport: Arc::new(transport),
        events: events_tx,
        failures: failures_tx,
    };

    ShardHarness {
        handle: Shard::spawn(ShardInfo::new(0, 1).unwrap(), bucket, ctx),
        listener,
        events,
        failures,
    }
}

/// Next non-heartbeat message, acknowledging heartbeats on the way
pub async fn next_command(peer: &mut MemoryPeer) -> Option<GatewayMessage> {
    loop {
        let message = peer.recv_message().await?;
        if message.op == OpCode::Heartbeat {
            peer.send(&GatewayMessage::heartbeat_ack()).await;
            continue;
        }
        return Some(message);
    }
}

/// Send Hello and return the Identify or Resume that follows
pub async fn handshake(peer: &mut MemoryPeer) -> Option<GatewayMessage> {
    peer.send(&GatewayMessage::hello(HelloPayload::with_interval(
        HEARTBEAT_INTERVAL,
    )))
    .await;
    next_command(peer).await
}

pub fn ready_message(seq: u64, session_id: &str, shard: Option<ShardInfo>) -> GatewayMessage {
    GatewayMessage::dispatch(
        "READY",
        seq,
        json!({
            "v": 10,
            "session_id": session_id,
            "resume_gateway_url": RESUME_GATEWAY,
            "shard": shard,
            "user": { "id": "1", "username": "rucord" },
            "guilds": [],
        }),
    )
}

pub async fn ready(peer: &MemoryPeer, seq: u64, session_id: &str) {
    peer.send(&ready_message(seq, session_id, None)).await;
}

/// One Identify or Resume seen by a [`FakeGateway`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub shard_id: ShardId,
    pub op: OpCode,
    pub at: Instant,
}

/// Gateway that completes every handshake on its own
///
/// Shards listed in `reject` are closed with 4004 on Identify.
pub struct FakeGateway {
    log: Arc<Mutex<Vec<Record>>>,
}

impl FakeGateway {
    pub fn spawn(mut listener: MemoryListener, reject: &[ShardId]) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reject: Arc<HashSet<ShardId>> = Arc::new(reject.iter().copied().collect());

        let accept_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Some(peer) = listener.accept().await {
                tokio::spawn(serve(peer, Arc::clone(&accept_log), Arc::clone(&reject)));
            }
        });

        Self { log }
    }

    pub fn records(&self) -> Vec<Record> {
        self.log.lock().clone()
    }

    pub fn identifies(&self) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.op == OpCode::Identify)
            .collect()
    }
}

async fn serve(mut peer: MemoryPeer, log: Arc<Mutex<Vec<Record>>>, reject: Arc<HashSet<ShardId>>) {
    let Some(command) = handshake(&mut peer).await else {
        return;
    };
    let mut seq = 1;

    match command.op {
        OpCode::Identify => {
            let Some(shard) = command.as_identify().and_then(|i| i.shard) else {
                return;
            };
            log.lock().push(Record {
                shard_id: shard.id(),
                op: OpCode::Identify,
                at: Instant::now(),
            });
            if reject.contains(&shard.id()) {
                peer.close(4004).await;
                return;
            }
            let session_id = format!("session-{}", shard.id());
            peer.send(&ready_message(seq, &session_id, Some(shard))).await;
        }
        OpCode::Resume => {
            let Some(resume) = command.as_resume() else {
                return;
            };
            let Some(shard_id) = resume
                .session_id
                .strip_prefix("session-")
                .and_then(|id| id.parse().ok())
            else {
                return;
            };
            log.lock().push(Record {
                shard_id,
                op: OpCode::Resume,
                at: Instant::now(),
            });
            seq = resume.seq + 1;
            peer.send(&GatewayMessage::dispatch("RESUMED", seq, json!({})))
                .await;
        }
        _ => return,
    }

    while let Some(message) = next_command(&mut peer).await {
        if message.op == OpCode::PresenceUpdate {
            seq += 1;
            let data = json!({ "status": message.d.get("status") });
            peer.send(&GatewayMessage::dispatch("PRESENCE_UPDATE", seq, data))
                .await;
        }
    }
}
