//! Heartbeat driver
//!
//! Beats once after a random fraction of the interval, then once per
//! interval. A beat that finds the previous one unacknowledged does not go
//! out; the driver reports the connection as zombied and exits instead.

use super::HeartbeatState;
use crate::connection::SequenceCell;
use crate::protocol::GatewayMessage;
use crate::transport::Frame;
use rand::Rng;
use rucord_core::ShardId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Random delay in `[0, interval)` before the first beat
#[must_use]
pub fn first_beat_delay(interval: Duration) -> Duration {
    let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}

/// Running heartbeat task of one connection
#[derive(Debug)]
pub struct HeartbeatDriver {
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatDriver {
    /// Start heartbeating on `outbound`
    ///
    /// The returned receiver resolves when the connection is detected as
    /// zombied.
    pub fn spawn(
        shard_id: ShardId,
        interval: Duration,
        first_delay: Duration,
        outbound: mpsc::Sender<Frame>,
        state: Arc<HeartbeatState>,
        sequence: Arc<SequenceCell>,
    ) -> (Self, oneshot::Receiver<()>) {
        let interval = interval.max(Duration::from_millis(1));
        let (zombie_tx, zombie_rx) = oneshot::channel();

        let handle = tokio::spawn(run(
            shard_id,
            interval,
            first_delay,
            outbound,
            state,
            sequence,
            zombie_tx,
        ));

        tracing::debug!(
            shard_id,
            interval = ?interval,
            first_delay = ?first_delay,
            "Heartbeat started"
        );

        (
            Self {
                interval,
                handle: Some(handle),
            },
            zombie_rx,
        )
    }

    /// Heartbeat interval
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait until it is gone
    ///
    /// No heartbeat is queued after this returns.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for HeartbeatDriver {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(
    shard_id: ShardId,
    interval: Duration,
    first_delay: Duration,
    outbound: mpsc::Sender<Frame>,
    state: Arc<HeartbeatState>,
    sequence: Arc<SequenceCell>,
    zombie: oneshot::Sender<()>,
) {
    sleep(first_delay).await;

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if state.is_awaiting_ack() {
            tracing::warn!(shard_id, "Heartbeat not acknowledged, connection zombied");
            let _ = zombie.send(());
            return;
        }

        let seq = sequence.get();
        let frame = match Frame::message(&GatewayMessage::heartbeat(seq)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(shard_id, error = %e, "Failed to encode heartbeat");
                return;
            }
        };

        // Marked before sending so an ack can never race ahead of it
        state.record_sent();
        if outbound.send(frame).await.is_err() {
            tracing::debug!(shard_id, "Socket closed, heartbeat stopped");
            return;
        }
        tracing::trace!(shard_id, seq = ?seq, "Heartbeat sent");

        ticker.tick().await;
    }
}
