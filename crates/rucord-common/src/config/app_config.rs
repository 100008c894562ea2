//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use rucord_core::GatewayIntents;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub discord: DiscordConfig,
    pub reconnect: ReconnectConfig,
    pub timeouts: TimeoutConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Number of shards to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardCount {
    /// Use the count recommended by `GET /gateway/bot`
    #[default]
    Auto,
    /// Run exactly this many shards
    Fixed(u32),
}

impl FromStr for ShardCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<u32>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidValue(
                "DISCORD_SHARD_COUNT",
                format!("expected \"auto\" or an integer >= 1, got {s:?}"),
            )),
            Ok(n) => Ok(Self::Fixed(n)),
        }
    }
}

impl fmt::Display for ShardCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Discord credentials and sharding options
#[derive(Clone)]
pub struct DiscordConfig {
    /// Bot token (without the `Bot ` prefix)
    pub token: String,
    pub intents: GatewayIntents,
    pub shard_count: ShardCount,
    /// Identify concurrency; overridden by `/gateway/bot` when sharding automatically
    pub max_concurrency: u32,
    pub gateway_url: String,
    pub api_base: String,
    pub large_threshold: Option<u32>,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("shard_count", &self.shard_count)
            .field("max_concurrency", &self.max_concurrency)
            .field("gateway_url", &self.gateway_url)
            .field("api_base", &self.api_base)
            .field("large_threshold", &self.large_threshold)
            .finish()
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before a shard gives up
    pub max_attempts: u32,
}

impl ReconnectConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_reconnect_base_ms(),
            max_delay_ms: default_reconnect_max_ms(),
            max_attempts: default_max_reconnect_attempts(),
        }
    }
}

/// Startup and handshake timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// How long `start` waits for every shard to become ready
    pub startup_secs: u64,
    /// How long a single connection may take to reach READY/RESUMED
    pub identify_secs: u64,
}

impl TimeoutConfig {
    #[must_use]
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    #[must_use]
    pub fn identify(&self) -> Duration {
        Duration::from_secs(self.identify_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_secs: default_startup_timeout(),
            identify_secs: default_identify_timeout(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "rucord".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_startup_timeout() -> u64 {
    300 // 5 minutes
}

fn default_identify_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `DISCORD_TOKEN` is missing or a value fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("DISCORD_TOKEN")
            .map(|t| t.trim().trim_start_matches("Bot ").to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingVar("DISCORD_TOKEN"))?;

        let intents = match lookup("DISCORD_INTENTS") {
            Some(raw) => GatewayIntents::parse(&raw)
                .map_err(|e| ConfigError::InvalidValue("DISCORD_INTENTS", e.to_string()))?,
            None => GatewayIntents::default(),
        };

        let shard_count = match lookup("DISCORD_SHARD_COUNT") {
            Some(raw) => raw.parse()?,
            None => ShardCount::default(),
        };

        let max_concurrency = parse_or(&lookup, "DISCORD_MAX_CONCURRENCY", default_max_concurrency)?;
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "DISCORD_MAX_CONCURRENCY",
                "must be at least 1".to_string(),
            ));
        }

        let large_threshold = lookup("GATEWAY_LARGE_THRESHOLD")
            .map(|raw| {
                raw.trim()
                    .parse::<u32>()
                    .map_err(|e| ConfigError::InvalidValue("GATEWAY_LARGE_THRESHOLD", e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            discord: DiscordConfig {
                token,
                intents,
                shard_count,
                max_concurrency,
                gateway_url: lookup("DISCORD_GATEWAY_URL").unwrap_or_else(default_gateway_url),
                api_base: lookup("DISCORD_API_BASE").unwrap_or_else(default_api_base),
                large_threshold,
            },
            reconnect: ReconnectConfig {
                base_delay_ms: parse_or(&lookup, "GATEWAY_RECONNECT_BASE_MS", default_reconnect_base_ms)?,
                max_delay_ms: parse_or(&lookup, "GATEWAY_RECONNECT_MAX_MS", default_reconnect_max_ms)?,
                max_attempts: parse_or(
                    &lookup,
                    "GATEWAY_MAX_RECONNECT_ATTEMPTS",
                    default_max_reconnect_attempts,
                )?,
            },
            timeouts: TimeoutConfig {
                startup_secs: parse_or(&lookup, "GATEWAY_STARTUP_TIMEOUT_SECS", default_startup_timeout)?,
                identify_secs: parse_or(&lookup, "GATEWAY_IDENTIFY_TIMEOUT_SECS", default_identify_timeout)?,
            },
        })
    }
}

/// Parse an optional variable, falling back to a default when unset
fn parse_or<F, T>(lookup: &F, key: &'static str, default: fn() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, e.to_string())),
        None => Ok(default()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
