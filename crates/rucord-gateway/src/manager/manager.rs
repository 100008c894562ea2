//! Gateway manager

use super::EventStream;
use crate::bucket::{BucketSet, ShardBucket};
use crate::connection::ConnectionState;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{ShardEvent, ShardFailure};
use crate::protocol::{GatewayMessage, PresenceUpdatePayload};
use crate::ratelimit::IdentifyRateLimiter;
use crate::rest::GatewayBotClient;
use crate::shard::{wait_until_settled, Shard, ShardConfig, ShardContext, ShardHandle};
use crate::transport::{Transport, TungsteniteTransport};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use rucord_common::{AppConfig, ShardCount};
use rucord_core::{ShardId, ShardInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

/// How long `start` waits for every shard by default
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs all shards of one bot
///
/// Uses `DashMap` so shard handles can be looked up while others start or
/// stop.
pub struct GatewayManager {
    config: Arc<ShardConfig>,
    transport: Arc<dyn Transport>,
    limiter: Arc<IdentifyRateLimiter>,
    owns_limiter: bool,
    bot: Option<GatewayBotClient>,
    shard_count: ShardCount,
    max_concurrency: u32,
    startup_timeout: Duration,

    shards: DashMap<ShardId, ShardHandle>,
    started: AtomicBool,

    events_tx: mpsc::UnboundedSender<ShardEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ShardEvent>>>,
    failures_tx: mpsc::UnboundedSender<ShardFailure>,
    failures_rx: Mutex<Option<mpsc::UnboundedReceiver<ShardFailure>>>,
}

impl GatewayManager {
    /// Create a manager for one shard with no REST lookup
    #[must_use]
    pub fn new(config: ShardConfig, transport: Arc<dyn Transport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        Self {
            config: Arc::new(config),
            transport,
            limiter: Arc::new(IdentifyRateLimiter::new()),
            owns_limiter: true,
            bot: None,
            shard_count: ShardCount::Fixed(1),
            max_concurrency: 1,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shards: DashMap::new(),
            started: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            failures_tx,
            failures_rx: Mutex::new(Some(failures_rx)),
        }
    }

    /// Create a manager over WebSockets from the application config
    pub fn from_app_config(config: &AppConfig) -> GatewayResult<Self> {
        let bot = GatewayBotClient::new(&config.discord.api_base, &config.discord.token)?;

        Ok(Self::new(
            ShardConfig::from_app_config(config),
            Arc::new(TungsteniteTransport::new()),
        )
        .with_bot_client(bot)
        .with_shard_count(config.discord.shard_count, config.discord.max_concurrency)
        .with_startup_timeout(config.timeouts.startup()))
    }

    /// Look up `/gateway/bot` in [`connect`](Self::connect)
    #[must_use]
    pub fn with_bot_client(mut self, bot: GatewayBotClient) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Sharding used by [`connect`](Self::connect)
    #[must_use]
    pub fn with_shard_count(mut self, shard_count: ShardCount, max_concurrency: u32) -> Self {
        self.shard_count = shard_count;
        self.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Share an identify limiter with other managers of the same bot
    ///
    /// A shared limiter keeps its grant history across [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn with_identify_limiter(mut self, limiter: Arc<IdentifyRateLimiter>) -> Self {
        self.limiter = limiter;
        self.owns_limiter = false;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    #[must_use]
    pub fn identify_limiter(&self) -> &Arc<IdentifyRateLimiter> {
        &self.limiter
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Start with the configured sharding
    ///
    /// Fetches `/gateway/bot` when a bot client is set: its URL replaces the
    /// configured gateway URL, its `max_concurrency` is used, and with
    /// [`ShardCount::Auto`] its recommended shard count too. Fails with
    /// [`GatewayError::NotEnoughSessionsRemaining`] before any connection is
    /// opened when the session budget is too small.
    pub async fn connect(&self) -> GatewayResult<()> {
        let Some(bot) = &self.bot else {
            return match self.shard_count {
                ShardCount::Fixed(count) => self.start(count, self.max_concurrency).await,
                ShardCount::Auto => Err(GatewayError::InvalidShardConfig(
                    "automatic shard count needs the gateway bot endpoint".to_string(),
                )),
            };
        };

        let info = bot.fetch().await?;
        let limit = info.session_start_limit;
        let shard_count = match self.shard_count {
            ShardCount::Auto => info.shards.max(1),
            ShardCount::Fixed(count) => count,
        };

        if !limit.can_start(shard_count) {
            return Err(GatewayError::NotEnoughSessionsRemaining {
                remaining: limit.remaining,
                required: shard_count,
            });
        }

        let config = ShardConfig {
            gateway_url: info.url,
            ..(*self.config).clone()
        };
        self.start_with(Arc::new(config), shard_count, limit.max_concurrency.max(1))
            .await
    }

    /// Start `shard_count` shards identifying `max_concurrency` at a time
    ///
    /// Shards of one bucket are started in ascending order, each once the
    /// previous one is ready or has failed; buckets start concurrently.
    /// Returns once every shard is `Ready`, or [`GatewayError::StartupFailed`]
    /// with the shards that were not ready at the startup timeout. Shards keep
    /// running either way until [`shutdown`](Self::shutdown).
    pub async fn start(&self, shard_count: u32, max_concurrency: u32) -> GatewayResult<()> {
        self.start_with(Arc::clone(&self.config), shard_count, max_concurrency)
            .await
    }

    async fn start_with(
        &self,
        config: Arc<ShardConfig>,
        shard_count: u32,
        max_concurrency: u32,
    ) -> GatewayResult<()> {
        let buckets = BucketSet::new(shard_count, max_concurrency, &self.limiter)?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyStarted);
        }

        tracing::info!(
            shard_count,
            max_concurrency,
            buckets = buckets.len(),
            gateway_url = %config.gateway_url,
            "Starting gateway"
        );

        let ctx = ShardContext {
            config,
            transport: Arc::clone(&self.transport),
            events: self.events_tx.clone(),
            failures: self.failures_tx.clone(),
        };
        let deadline = Instant::now() + self.startup_timeout;

        let starts = buckets
            .iter()
            .map(|bucket| self.start_bucket(Arc::clone(bucket), shard_count, &ctx, deadline));
        for result in join_all(starts).await {
            result?;
        }

        let mut failed: Vec<ShardId> = self
            .shards
            .iter()
            .filter(|entry| !entry.value().is_ready())
            .map(|entry| *entry.key())
            .collect();
        failed.sort_unstable();

        if failed.is_empty() {
            tracing::info!(shard_count, "All shards ready");
            Ok(())
        } else {
            tracing::error!(?failed, shard_count, "Shards failed to start");
            Err(GatewayError::StartupFailed { failed })
        }
    }

    async fn start_bucket(
        &self,
        bucket: Arc<ShardBucket>,
        shard_count: u32,
        ctx: &ShardContext,
        deadline: Instant,
    ) -> GatewayResult<()> {
        for &shard_id in bucket.shards() {
            let info = ShardInfo::new(shard_id, shard_count)?;
            let handle = Shard::spawn(info, Arc::clone(&bucket), ctx.clone());
            let mut status = handle.subscribe();
            self.shards.insert(shard_id, handle);

            match timeout_at(deadline, wait_until_settled(&mut status)).await {
                Ok(state) => {
                    tracing::debug!(shard_id, state = %state, "Shard settled");
                }
                Err(_) => {
                    tracing::warn!(shard_id, "Startup timeout reached while shard was starting");
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Send a caller command on one shard
    ///
    /// Only Presence Update and Request Guild Members are accepted; the
    /// handshake and heartbeat ops belong to the shard.
    pub async fn send(&self, shard_id: ShardId, message: GatewayMessage) -> GatewayResult<()> {
        if !message.op.is_user_command() {
            return Err(GatewayError::InvalidCommand(message.op));
        }
        let sender = self
            .shards
            .get(&shard_id)
            .map(|handle| handle.sender())
            .ok_or(GatewayError::UnknownShard(shard_id))?;
        sender.send(message).await
    }

    /// Update the bot's presence on one shard
    pub async fn update_presence(
        &self,
        shard_id: ShardId,
        presence: &PresenceUpdatePayload,
    ) -> GatewayResult<()> {
        self.send(shard_id, GatewayMessage::presence_update(presence))
            .await
    }

    // =========================================================================
    // Streams and state
    // =========================================================================

    /// Merged dispatch events; only the first call gets the stream
    pub fn events(&self) -> Option<EventStream> {
        self.events_rx.lock().take().map(EventStream::new)
    }

    /// Shards that stopped for good; only the first call gets the receiver
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<ShardFailure>> {
        self.failures_rx.lock().take()
    }

    #[must_use]
    pub fn shard_state(&self, shard_id: ShardId) -> Option<ConnectionState> {
        self.shards.get(&shard_id).map(|handle| handle.state())
    }

    /// Running shard ids, ascending
    #[must_use]
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<ShardId> = self.shards.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.shards.iter().filter(|entry| entry.value().is_ready()).count()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Close every shard with 1000 and release identify state
    ///
    /// Identify state is only released when the limiter is not shared.
    pub async fn shutdown(&self) {
        let ids = self.shard_ids();
        let handles: Vec<ShardHandle> = ids
            .iter()
            .filter_map(|id| self.shards.remove(id).map(|(_, handle)| handle))
            .collect();

        tracing::info!(shards = handles.len(), "Shutting down gateway");
        join_all(handles.into_iter().map(ShardHandle::shutdown)).await;
        if self.owns_limiter {
            self.limiter.clear();
        }
        tracing::info!("Gateway shut down");
    }
}

impl std::fmt::Debug for GatewayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayManager")
            .field("config", &self.config)
            .field("shard_count", &self.shard_count)
            .field("max_concurrency", &self.max_concurrency)
            .field("shards", &self.shard_ids())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
