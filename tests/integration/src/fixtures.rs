//! Test fixtures
//!
//! Shard and manager settings shortened for real-time tests.

use rucord_gateway::ratelimit::IdentifyRateLimiter;
use rucord_gateway::ShardConfig;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_TOKEN: &str = "integration-token";

/// Identify window used instead of Discord's 5 seconds
pub const FAST_IDENTIFY_WINDOW: Duration = Duration::from_millis(200);

/// Shard config with short timeouts and backoff
pub fn fast_config(gateway_url: &str) -> ShardConfig {
    ShardConfig::new(TEST_TOKEN)
        .with_gateway_url(gateway_url)
        .with_identify_timeout(Duration::from_secs(5))
        .with_reconnect(Duration::from_millis(50), Duration::from_millis(200), 5)
}

pub fn fast_limiter() -> Arc<IdentifyRateLimiter> {
    Arc::new(IdentifyRateLimiter::with_window(FAST_IDENTIFY_WINDOW))
}
