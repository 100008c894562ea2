//! Shard configuration

use crate::connection::Backoff;
use crate::protocol::{IdentifyProperties, PresenceUpdatePayload};
use rucord_common::AppConfig;
use rucord_core::GatewayIntents;
use std::fmt;
use std::time::Duration;

/// Settings shared by every shard of a manager
#[derive(Clone)]
pub struct ShardConfig {
    /// Bot token, without the `Bot ` prefix
    pub token: String,
    pub intents: GatewayIntents,
    /// Gateway URL for fresh sessions
    pub gateway_url: String,
    pub properties: IdentifyProperties,
    pub large_threshold: Option<u32>,
    /// Presence sent with Identify
    pub presence: Option<PresenceUpdatePayload>,
    /// Time from connect until READY/RESUMED before the attempt is abandoned
    pub identify_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Consecutive failed reconnects before the shard gives up
    pub max_reconnect_attempts: u32,
    /// Time in `Ready` after which the backoff starts over
    pub stable_after: Duration,
}

impl ShardConfig {
    pub const DEFAULT_GATEWAY_URL: &'static str = "wss://gateway.discord.gg";

    /// Configuration with default timings
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: GatewayIntents::default(),
            gateway_url: Self::DEFAULT_GATEWAY_URL.to_string(),
            properties: IdentifyProperties::default(),
            large_threshold: None,
            presence: None,
            identify_timeout: Duration::from_secs(30),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(60),
            max_reconnect_attempts: 10,
            stable_after: Duration::from_secs(60),
        }
    }

    /// Configuration from the environment-derived application config
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            token: config.discord.token.clone(),
            intents: config.discord.intents,
            gateway_url: config.discord.gateway_url.clone(),
            properties: IdentifyProperties::default(),
            large_threshold: config.discord.large_threshold,
            presence: None,
            identify_timeout: config.timeouts.identify(),
            reconnect_base: config.reconnect.base_delay(),
            reconnect_max: config.reconnect.max_delay(),
            max_reconnect_attempts: config.reconnect.max_attempts,
            stable_after: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_intents(mut self, intents: GatewayIntents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    #[must_use]
    pub fn with_identify_timeout(mut self, timeout: Duration) -> Self {
        self.identify_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, base: Duration, max: Duration, max_attempts: u32) -> Self {
        self.reconnect_base = base;
        self.reconnect_max = max;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_stable_after(mut self, stable_after: Duration) -> Self {
        self.stable_after = stable_after;
        self
    }

    /// Fresh backoff for one shard
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_base,
            self.reconnect_max,
            self.max_reconnect_attempts,
        )
    }
}

impl fmt::Debug for ShardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardConfig")
            .field("token", &"[REDACTED]")
            .field("intents", &self.intents)
            .field("gateway_url", &self.gateway_url)
            .field("large_threshold", &self.large_threshold)
            .field("identify_timeout", &self.identify_timeout)
            .field("reconnect_base", &self.reconnect_base)
            .field("reconnect_max", &self.reconnect_max)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShardConfig::new("token");
        assert_eq!(config.gateway_url, "wss://gateway.discord.gg");
        assert_eq!(config.identify_timeout, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(!config.intents.is_privileged());
    }

    #[test]
    fn test_from_app_config() {
        let app = AppConfig::from_lookup(|key| match key {
            "DISCORD_TOKEN" => Some("Bot abc".to_string()),
            "DISCORD_INTENTS" => Some("513".to_string()),
            "GATEWAY_IDENTIFY_TIMEOUT_SECS" => Some("12".to_string()),
            "GATEWAY_MAX_RECONNECT_ATTEMPTS" => Some("3".to_string()),
            _ => None,
        })
        .unwrap();

        let config = ShardConfig::from_app_config(&app);
        assert_eq!(config.token, "abc");
        assert_eq!(
            config.intents,
            GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES
        );
        assert_eq!(config.identify_timeout, Duration::from_secs(12));
        assert_eq!(config.backoff().max_attempts(), 3);
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", ShardConfig::new("very-secret"));
        assert!(!debug.contains("very-secret"));
    }
}
