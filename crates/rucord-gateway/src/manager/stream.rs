//! Merged event stream

use crate::events::ShardEvent;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Dispatch events of every shard, in arrival order
///
/// Events of one shard arrive in sequence order. The stream ends only once
/// the manager and all of its shards are gone.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ShardEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ShardEvent>) -> Self {
        Self { rx }
    }

    /// Next event
    pub async fn recv(&mut self) -> Option<ShardEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already buffered
    pub fn try_recv(&mut self) -> Option<ShardEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = ShardEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
