//! Gateway runner entry point
//!
//! Run with:
//! ```bash
//! DISCORD_TOKEN=... cargo run -p rucord-gateway
//! ```
//!
//! Configuration is loaded from environment variables (and `.env`).

use anyhow::Context;
use rucord_common::{try_init_tracing, try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // No-op when tracing is already set up
        let _ = try_init_tracing();
        error!(error = ?e, "Gateway stopped with an error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        shard_count = %config.discord.shard_count,
        intents = %config.discord.intents,
        "Configuration loaded"
    );

    rucord_gateway::run(config)
        .await
        .context("gateway failed")?;

    info!("Gateway stopped");
    Ok(())
}
