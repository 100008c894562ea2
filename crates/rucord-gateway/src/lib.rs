//! # rucord-gateway
//!
//! Discord gateway connection core: shards, heartbeats, identify rate
//! limiting, resume and reconnect, and a manager that merges the events of
//! every shard into one stream.

pub mod bucket;
pub mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod manager;
pub mod protocol;
pub mod ratelimit;
pub mod rest;
pub mod shard;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use error::{GatewayError, GatewayResult};
pub use events::{GatewayEvent, ShardEvent, ShardFailure};
pub use manager::{EventStream, GatewayManager};
pub use shard::ShardConfig;

use futures::StreamExt;
use rucord_common::AppConfig;

/// Run a gateway from the application config until Ctrl-C
///
/// Logs every dispatched event and every shard that stops for good.
pub async fn run(config: AppConfig) -> GatewayResult<()> {
    let manager = GatewayManager::from_app_config(&config)?;
    let mut events = manager.events().ok_or(GatewayError::AlreadyStarted)?;
    let mut failures = manager.failures().ok_or(GatewayError::AlreadyStarted)?;

    if let Err(e) = manager.connect().await {
        match &e {
            GatewayError::StartupFailed { failed } => {
                tracing::warn!(?failed, "Continuing with the shards that started");
            }
            _ => {
                manager.shutdown().await;
                return Err(e);
            }
        }
    }

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                tracing::info!(
                    shard_id = event.shard_id,
                    event = event.name().unwrap_or("?"),
                    seq = event.sequence(),
                    "Dispatch"
                );
            }
            Some(failure) = failures.recv() => {
                tracing::error!(
                    shard_id = failure.shard_id,
                    error = %failure.error,
                    "Shard stopped"
                );
                if manager.ready_count() == 0 && failure.error.is_fatal() {
                    tracing::error!("No shards left running");
                    break;
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
