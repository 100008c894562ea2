//! Outbound command budget
//!
//! The gateway disconnects clients that send more than 120 commands in a
//! minute. Each connection paces its sends through this limiter.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

/// Commands allowed per minute on one connection
pub const COMMANDS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(120) {
    Some(n) => n,
    None => unreachable!(),
};

/// Per-connection outbound command limiter
#[derive(Debug)]
pub struct CommandRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl CommandRateLimiter {
    /// Create a limiter with the gateway's budget
    #[must_use]
    pub fn new() -> Self {
        Self::per_minute(COMMANDS_PER_MINUTE)
    }

    /// Create a limiter allowing `commands` per minute
    #[must_use]
    pub fn per_minute(commands: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(commands)),
        }
    }

    /// Wait until one more command may be sent
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Take one command slot without waiting
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for CommandRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
