//! Connection state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a shard's connection
///
/// ```text
/// Disconnected -> Connecting -> AwaitingHello -> Identifying -> Ready
///                                                                 |
///        Zombied / Closing <--------------------------------------+
///                 |
///                 +--> Disconnected (retry) or Failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection, possibly waiting to reconnect
    #[default]
    Disconnected,
    /// Opening the WebSocket
    Connecting,
    /// Connected, waiting for Hello
    AwaitingHello,
    /// Identify or Resume in flight
    Identifying,
    /// READY or RESUMED received
    Ready,
    /// Heartbeat went unacknowledged
    Zombied,
    /// Close frame being sent
    Closing,
    /// Stopped for good
    Failed,
}

impl ConnectionState {
    /// Check if commands can be sent
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if the shard will never leave this state
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if a WebSocket is open in this state
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(
            self,
            Self::AwaitingHello | Self::Identifying | Self::Ready | Self::Zombied | Self::Closing
        )
    }

    /// Get the name of this state
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::Identifying => "Identifying",
            Self::Ready => "Ready",
            Self::Zombied => "Zombied",
            Self::Closing => "Closing",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
