//! Heartbeat bookkeeping shared between a shard and its driver

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    awaiting_ack: bool,
    last_sent: Option<Instant>,
    last_ack: Option<Instant>,
    latency: Option<Duration>,
}

/// Heartbeat timestamps of one connection
#[derive(Debug, Default)]
pub struct HeartbeatState {
    inner: Mutex<Inner>,
}

impl HeartbeatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat going out
    pub fn record_sent(&self) {
        let mut inner = self.inner.lock();
        inner.awaiting_ack = true;
        inner.last_sent = Some(Instant::now());
    }

    /// Record a HeartbeatAck, returning the round trip of the last beat
    pub fn record_ack(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.awaiting_ack = false;
        inner.last_ack = Some(now);
        inner.latency = inner.last_sent.map(|sent| now.saturating_duration_since(sent));
        inner.latency
    }

    /// Check if the last heartbeat is still unacknowledged
    #[must_use]
    pub fn is_awaiting_ack(&self) -> bool {
        self.inner.lock().awaiting_ack
    }

    /// When the last heartbeat went out
    #[must_use]
    pub fn last_sent(&self) -> Option<Instant> {
        self.inner.lock().last_sent
    }

    /// When the last ack arrived
    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> {
        self.inner.lock().last_ack
    }

    /// Round trip of the most recently acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.inner.lock().latency
    }
}
