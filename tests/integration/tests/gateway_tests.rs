//! Gateway Integration Tests
//!
//! Shards connect over real WebSockets (tokio-tungstenite) to a mock gateway
//! bound to an ephemeral localhost port. No Discord credentials are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use integration_tests::{
    fast_config, fast_limiter, wait_until, MockGateway, MockOptions, Seen, TEST_TOKEN,
};
use rucord_common::ShardCount;
use rucord_gateway::connection::ConnectionState;
use rucord_gateway::rest::GatewayBotClient;
use rucord_gateway::transport::TungsteniteTransport;
use rucord_gateway::{GatewayError, GatewayManager};

const WAIT: Duration = Duration::from_secs(5);

fn manager(gateway: &MockGateway) -> GatewayManager {
    GatewayManager::new(
        fast_config(&gateway.ws_url()),
        Arc::new(TungsteniteTransport::new()),
    )
    .with_identify_limiter(fast_limiter())
    .with_startup_timeout(WAIT)
}

fn bot_client(gateway: &MockGateway) -> GatewayBotClient {
    GatewayBotClient::new(gateway.api_base(), TEST_TOKEN).expect("Failed to build client")
}

// ============================================================================
// Gateway Bot Lookup
// ============================================================================

#[tokio::test]
async fn test_gateway_bot_lookup_is_authorized_and_cached() {
    let gateway = MockGateway::start_with(MockOptions {
        recommended_shards: 4,
        max_concurrency: 2,
        ..MockOptions::default()
    })
    .await
    .expect("Failed to start mock gateway");

    let client = bot_client(&gateway);
    let info = client.fetch().await.unwrap();
    assert_eq!(info.url, gateway.ws_url());
    assert_eq!(info.shards, 4);
    assert_eq!(info.session_start_limit.max_concurrency, 2);

    client.fetch().await.unwrap();
    assert_eq!(
        gateway.bot_requests(),
        vec![Some(format!("Bot {TEST_TOKEN}"))]
    );
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_single_shard_reaches_ready() {
    let gateway = MockGateway::start().await.expect("Failed to start mock gateway");
    let manager = manager(&gateway);
    let mut events = manager.events().unwrap();

    manager.start(1, 1).await.unwrap();
    assert_eq!(manager.shard_state(0), Some(ConnectionState::Ready));

    let ready = events.next().await.unwrap();
    assert_eq!(ready.shard_id, 0);
    assert_eq!(ready.name(), Some("READY"));
    assert_eq!(gateway.identified_shards(), vec![0]);

    manager.shutdown().await;
    assert!(wait_until(WAIT, || gateway.seen().contains(&Seen::Close(Some(1000)))).await);
}

#[tokio::test]
async fn test_auto_sharding_uses_gateway_bot() {
    let gateway = MockGateway::start_with(MockOptions {
        recommended_shards: 3,
        ..MockOptions::default()
    })
    .await
    .expect("Failed to start mock gateway");

    // The configured URL is replaced by the one from /gateway/bot
    let manager = GatewayManager::new(
        fast_config("ws://127.0.0.1:9"),
        Arc::new(TungsteniteTransport::new()),
    )
    .with_identify_limiter(fast_limiter())
    .with_startup_timeout(WAIT)
    .with_bot_client(bot_client(&gateway))
    .with_shard_count(ShardCount::Auto, 1);

    manager.connect().await.unwrap();
    assert_eq!(manager.shard_ids(), vec![0, 1, 2]);
    assert_eq!(manager.ready_count(), 3);
    assert_eq!(gateway.identified_shards(), vec![0, 1, 2]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_not_enough_sessions_opens_no_socket() {
    let gateway = MockGateway::start_with(MockOptions {
        recommended_shards: 2,
        remaining: 1,
        ..MockOptions::default()
    })
    .await
    .expect("Failed to start mock gateway");

    let manager = manager(&gateway)
        .with_bot_client(bot_client(&gateway))
        .with_shard_count(ShardCount::Auto, 1);

    let result = manager.connect().await;
    assert!(matches!(
        result,
        Err(GatewayError::NotEnoughSessionsRemaining {
            remaining: 1,
            required: 2
        })
    ));
    assert_eq!(gateway.connections(), 0);
    assert!(!manager.is_started());
}

// ============================================================================
// Session Lifecycle
// ============================================================================

#[tokio::test]
async fn test_resumes_after_server_close() {
    let gateway = MockGateway::start_with(MockOptions {
        close_first_session: Some(4000),
        ..MockOptions::default()
    })
    .await
    .expect("Failed to start mock gateway");

    let manager = manager(&gateway);
    let mut events = manager.events().unwrap();
    manager.start(1, 1).await.unwrap();

    let first = events.next().await.unwrap();
    assert_eq!(first.name(), Some("READY"));
    let second = events.next().await.unwrap();
    assert_eq!(second.name(), Some("RESUMED"));
    assert_eq!(second.sequence(), Some(2));

    assert!(gateway.seen().contains(&Seen::Resume {
        session_id: "mock-session-0".to_string(),
        seq: 1,
    }));
    assert_eq!(gateway.identified_shards(), vec![0]);
    assert_eq!(gateway.connections(), 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_heartbeats_keep_shard_ready() {
    let gateway = MockGateway::start_with(MockOptions {
        heartbeat_interval: 100,
        ..MockOptions::default()
    })
    .await
    .expect("Failed to start mock gateway");

    let manager = manager(&gateway);
    manager.start(1, 1).await.unwrap();

    assert!(wait_until(WAIT, || gateway.heartbeats() >= 3).await);
    assert_eq!(manager.shard_state(0), Some(ConnectionState::Ready));
    assert_eq!(gateway.connections(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_fatal_close_surfaces_failure() {
    let gateway = MockGateway::start_with(MockOptions {
        close_first_session: Some(4004),
        ..MockOptions::default()
    })
    .await
    .expect("Failed to start mock gateway");

    let manager = manager(&gateway);
    let mut failures = manager.failures().unwrap();

    // READY and the close arrive back to back, startup may observe either
    let _ = manager.start(1, 1).await;

    let failure = tokio::time::timeout(WAIT, failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.shard_id, 0);
    assert!(matches!(failure.error, GatewayError::AuthenticationFailed));
    assert_eq!(manager.shard_state(0), Some(ConnectionState::Failed));
    assert_eq!(gateway.connections(), 1);
}
