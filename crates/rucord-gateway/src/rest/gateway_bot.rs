//! `GET /gateway/bot`
//!
//! Gives the gateway URL, the recommended shard count and the session start
//! budget. Responses are cached until the budget resets.

use crate::error::GatewayResult;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use rucord_core::GatewayBotInfo;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

const USER_AGENT_VALUE: &str = concat!(
    "DiscordBot (https://github.com/rucord/rucord, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct Cached {
    info: GatewayBotInfo,
    expires_at: Instant,
}

/// Client for the gateway bot endpoint
pub struct GatewayBotClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    cache: Mutex<Option<Cached>>,
}

impl GatewayBotClient {
    /// Create a client for `api_base`, e.g. `https://discord.com/api/v10`
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> GatewayResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
            cache: Mutex::new(None),
        })
    }

    /// Full URL of the endpoint
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}/gateway/bot", self.api_base.trim_end_matches('/'))
    }

    /// Gateway bot info, from cache while the session budget has not reset
    pub async fn fetch(&self) -> GatewayResult<GatewayBotInfo> {
        if let Some(info) = self.cached() {
            tracing::debug!("Using cached gateway bot info");
            return Ok(info);
        }
        self.fetch_fresh().await
    }

    /// Gateway bot info, bypassing the cache
    pub async fn fetch_fresh(&self) -> GatewayResult<GatewayBotInfo> {
        let authorization = format!("Bot {}", self.token);
        let info: GatewayBotInfo = self
            .http
            .get(self.url())
            .header(AUTHORIZATION, authorization)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(
            url = %info.url,
            shards = info.shards,
            remaining = info.session_start_limit.remaining,
            max_concurrency = info.session_start_limit.max_concurrency,
            "Fetched gateway bot info"
        );

        self.store(info.clone());
        Ok(info)
    }

    /// Cached info if it has not expired
    #[must_use]
    pub fn cached(&self) -> Option<GatewayBotInfo> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.info.clone())
    }

    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    fn store(&self, info: GatewayBotInfo) {
        let expires_at =
            Instant::now() + Duration::from_millis(info.session_start_limit.reset_after);
        *self.cache.lock() = Some(Cached { info, expires_at });
    }
}

impl fmt::Debug for GatewayBotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBotClient")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
