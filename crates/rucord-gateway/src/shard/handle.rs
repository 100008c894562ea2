//! Handle to a running shard task

use crate::connection::ConnectionState;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::GatewayMessage;
use rucord_core::{ShardId, ShardInfo};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Time a shard gets to close cleanly before its task is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Requests from a handle to its shard task
#[derive(Debug)]
pub(crate) enum ShardCommand {
    /// Send a caller command on the current connection
    ///
    /// `reply` resolves once the frame is written or the command is dropped.
    Send {
        message: GatewayMessage,
        reply: oneshot::Sender<GatewayResult<()>>,
    },
    /// Close with 1000 and stop
    Shutdown,
}

/// Cloneable command side of a shard
#[derive(Debug, Clone)]
pub struct ShardSender {
    shard_id: ShardId,
    commands: mpsc::Sender<ShardCommand>,
    status: watch::Receiver<ConnectionState>,
}

impl ShardSender {
    #[must_use]
    pub const fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Send a command on the shard's connection
    ///
    /// Resolves once the frame is handed to the socket. Fails with
    /// [`GatewayError::ShardNotReady`] unless the shard is `Ready`, including
    /// when the connection drops before the command goes out.
    pub async fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        let not_ready = || GatewayError::ShardNotReady(self.shard_id);
        if !self.is_ready() {
            return Err(not_ready());
        }

        let (reply, delivered) = oneshot::channel();
        self.commands
            .send(ShardCommand::Send { message, reply })
            .await
            .map_err(|_| not_ready())?;
        delivered.await.map_err(|_| not_ready())?
    }
}

/// Caller side of a shard
#[derive(Debug)]
pub struct ShardHandle {
    info: ShardInfo,
    bucket_id: u32,
    sender: ShardSender,
    task: JoinHandle<()>,
}

impl ShardHandle {
    pub(crate) fn new(
        info: ShardInfo,
        bucket_id: u32,
        commands: mpsc::Sender<ShardCommand>,
        status: watch::Receiver<ConnectionState>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            info,
            bucket_id,
            sender: ShardSender {
                shard_id: info.id(),
                commands,
                status,
            },
            task,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ShardId {
        self.info.id()
    }

    #[must_use]
    pub const fn info(&self) -> ShardInfo {
        self.info
    }

    /// Identify bucket of this shard
    #[must_use]
    pub const fn bucket_id(&self) -> u32 {
        self.bucket_id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.sender.state()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.sender.is_ready()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.sender.status.clone()
    }

    /// Command sender that outlives borrows of this handle
    #[must_use]
    pub fn sender(&self) -> ShardSender {
        self.sender.clone()
    }

    pub async fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.sender.send(message).await
    }

    /// Wait until the shard is `Ready` or has failed
    pub async fn wait_until_settled(&self) -> ConnectionState {
        let mut status = self.subscribe();
        wait_until_settled(&mut status).await
    }

    /// Close the connection with 1000 and wait for the task to end
    pub async fn shutdown(mut self) {
        let _ = self.sender.commands.send(ShardCommand::Shutdown).await;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            tracing::warn!(shard_id = self.id(), "Shard did not stop in time, aborting");
            self.task.abort();
        }
    }
}

/// Wait until a watched state is `Ready` or terminal
///
/// A shard task that ended counts as settled in whatever state it left.
pub(crate) async fn wait_until_settled(
    status: &mut watch::Receiver<ConnectionState>,
) -> ConnectionState {
    let settled = status
        .wait_for(|state| state.is_ready() || state.is_terminal())
        .await
        .map(|state| *state);
    settled.unwrap_or_else(|_| *status.borrow())
}
