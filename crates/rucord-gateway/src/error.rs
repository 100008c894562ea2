//! Gateway errors

use crate::protocol::{CloseCode, OpCode};
use rucord_core::{ShardId, ShardInfoError};
use thiserror::Error;

/// Errors produced by shards and the gateway manager
#[derive(Debug, Error)]
pub enum GatewayError {
    // =========================================================================
    // Fatal Close Codes
    // =========================================================================
    #[error("Authentication failed: the gateway rejected the token")]
    AuthenticationFailed,

    #[error("Sharding required: too many guilds for the configured shard count")]
    ShardingRequired,

    #[error("Invalid shard configuration: {0}")]
    InvalidShardConfig(String),

    #[error("Gateway refused the session: {0}")]
    Refused(CloseCode),

    // =========================================================================
    // Session Errors
    // =========================================================================
    #[error("Session invalidated by the gateway")]
    SessionInvalidated,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Rate limited by the gateway")]
    RateLimited,

    #[error("Gave up on shard {shard_id} after {attempts} reconnect attempts")]
    RetriesExhausted { shard_id: ShardId, attempts: u32 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // =========================================================================
    // Manager Errors
    // =========================================================================
    #[error("Shard {0} is not ready")]
    ShardNotReady(ShardId),

    #[error("Unknown shard: {0}")]
    UnknownShard(ShardId),

    #[error("Op code {0} cannot be sent by callers")]
    InvalidCommand(OpCode),

    #[error("Shards failed to become ready: {failed:?}")]
    StartupFailed { failed: Vec<ShardId> },

    #[error("Not enough session starts remaining: {remaining} left, {required} required")]
    NotEnoughSessionsRemaining { remaining: u32, required: u32 },

    #[error("Gateway manager already started")]
    AlreadyStarted,

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Shard info error: {0}")]
    ShardInfo(#[from] ShardInfoError),
}

impl GatewayError {
    /// Error for a close code the shard must not reconnect after
    #[must_use]
    pub fn from_close_code(code: CloseCode) -> Self {
        match code {
            CloseCode::AuthenticationFailed => Self::AuthenticationFailed,
            CloseCode::ShardingRequired => Self::ShardingRequired,
            CloseCode::InvalidShard => {
                Self::InvalidShardConfig(code.description().to_string())
            }
            CloseCode::RateLimited => Self::RateLimited,
            CloseCode::InvalidSequence | CloseCode::SessionTimeout => Self::SessionInvalidated,
            other => Self::Refused(other),
        }
    }

    /// Close code this error corresponds to, if any
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::AuthenticationFailed => Some(CloseCode::AuthenticationFailed),
            Self::ShardingRequired => Some(CloseCode::ShardingRequired),
            Self::InvalidShardConfig(_) => Some(CloseCode::InvalidShard),
            Self::Refused(code) => Some(*code),
            Self::RateLimited => Some(CloseCode::RateLimited),
            _ => None,
        }
    }

    /// Get a short machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ShardingRequired => "SHARDING_REQUIRED",
            Self::InvalidShardConfig(_) => "INVALID_SHARD_CONFIG",
            Self::Refused(_) => "REFUSED",
            Self::SessionInvalidated => "SESSION_INVALIDATED",
            Self::ConnectionLost(_) => "CONNECTION_LOST",
            Self::RateLimited => "RATE_LIMITED",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::ShardNotReady(_) => "SHARD_NOT_READY",
            Self::UnknownShard(_) => "UNKNOWN_SHARD",
            Self::InvalidCommand(_) => "INVALID_COMMAND",
            Self::StartupFailed { .. } => "STARTUP_FAILED",
            Self::NotEnoughSessionsRemaining { .. } => "NOT_ENOUGH_SESSIONS",
            Self::AlreadyStarted => "ALREADY_STARTED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::ShardInfo(_) => "SHARD_INFO_ERROR",
        }
    }

    /// Check if a shard hitting this error must stop reconnecting
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::ShardingRequired
                | Self::InvalidShardConfig(_)
                | Self::Refused(_)
                | Self::RetriesExhausted { .. }
        )
    }

    /// Check if this error is a rejected caller request rather than a
    /// connection problem
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ShardNotReady(_)
                | Self::UnknownShard(_)
                | Self::InvalidCommand(_)
                | Self::AlreadyStarted
        )
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
