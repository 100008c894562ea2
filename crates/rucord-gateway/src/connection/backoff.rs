//! Reconnect backoff
//!
//! Exponential delay between reconnect attempts, with a ceiling on the
//! number of consecutive attempts.

use std::time::Duration;

/// Exponential backoff with an attempt ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff doubling from `base` up to `max`
    #[must_use]
    pub const fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, `None` once the ceiling is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt += 1;
        Some(delay)
    }

    /// Attempts made since the last reset
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Attempt ceiling
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Start over from the base delay
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 10)
    }
}
