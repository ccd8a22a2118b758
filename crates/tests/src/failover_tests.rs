//! Multi-provider failover scenarios: 429 demotion, cooldown recovery,
//! and stale-tip fallback.

use crate::mock_infrastructure::{
    test_helpers::{config_of, provider_entry},
    TonRpcMock,
};
use std::{sync::Arc, time::Duration};
use tonroute_core::{
    provider::{
        EnvSnapshot, HealthCheckerConfig, HealthStatus, ManagerOptions, ProviderManager,
        ProviderType, SelectorConfig,
    },
    types::Network,
};

fn options_with_cooldown(cooldown: Duration) -> ManagerOptions {
    let mut options = ManagerOptions::new(Network::Testnet);
    options.selector = SelectorConfig { cooldown, ..SelectorConfig::default() };
    options
}

async fn two_provider_manager(
    p1_url: &str,
    p2_url: &str,
    options: ManagerOptions,
) -> Arc<ProviderManager> {
    let config = config_of(vec![
        ("p1", provider_entry(p1_url, ProviderType::Custom, 10, 10)),
        ("p2", provider_entry(p2_url, ProviderType::Custom, 20, 10)),
    ]);
    ProviderManager::new(&config, &EnvSnapshot::empty(), options).unwrap()
}

#[tokio::test]
async fn test_two_provider_happy_path_with_429_failover() {
    let mut mock1 = TonRpcMock::new().await;
    mock1.mock_direct(1000).await;
    let mut mock2 = TonRpcMock::new().await;
    mock2.mock_direct(1000).await;

    let manager = two_provider_manager(
        &mock1.url(),
        &mock2.url(),
        options_with_cooldown(Duration::from_millis(300)),
    )
    .await;

    manager.probe_now().await;

    let p1 = manager.health().get("p1", Network::Testnet).unwrap();
    assert!(p1.success);
    assert_eq!(p1.status, HealthStatus::Available);
    assert_eq!(p1.seqno, Some(1000));

    // Priority decides between two healthy providers
    let url = manager.resolve_endpoint().await;
    assert!(url.starts_with(&mock1.url()), "got {url}");

    // A 429 against p1 demotes it; the next resolve fails over to p2
    manager.report_error("429 Too Many Requests");
    let url = manager.resolve_endpoint().await;
    assert!(url.starts_with(&mock2.url()), "got {url}");

    // After the cooldown a successful probe restores p1
    tokio::time::sleep(Duration::from_millis(350)).await;
    manager.probe_now().await;
    let url = manager.resolve_endpoint().await;
    assert!(url.starts_with(&mock1.url()), "got {url}");
}

#[tokio::test]
async fn test_stale_provider_is_fallback_only() {
    let mut mock1 = TonRpcMock::new().await;
    mock1.mock_direct(1000).await;
    let mut mock2 = TonRpcMock::new().await;
    mock2.mock_direct(980).await;

    // Sequential probing (batch of 1) so p1 establishes the tip before p2
    // is measured against it
    let mut options = options_with_cooldown(Duration::from_secs(30));
    options.health = HealthCheckerConfig { batch_size: 1, ..HealthCheckerConfig::default() };

    let manager = two_provider_manager(&mock1.url(), &mock2.url(), options).await;
    manager.probe_now().await;

    let p2 = manager.health().get("p2", Network::Testnet).unwrap();
    assert_eq!(p2.status, HealthStatus::Stale);
    assert!(p2.success);
    assert_eq!(p2.blocks_behind, 20);

    // Stale loses to available
    let url = manager.resolve_endpoint().await;
    assert!(url.starts_with(&mock1.url()), "got {url}");

    // When p1 fails, the stale provider is allowed as a last resort
    manager.report_error("request timed out");
    assert_eq!(
        manager.health().get("p1", Network::Testnet).unwrap().status,
        HealthStatus::Offline
    );

    let url = manager.resolve_endpoint().await;
    assert!(url.starts_with(&mock2.url()), "got {url}");
}

#[tokio::test]
async fn test_highest_seqno_is_monotonic_across_probes() {
    let mut mock1 = TonRpcMock::new().await;
    mock1.mock_direct(1000).await;
    let mut mock2 = TonRpcMock::new().await;
    mock2.mock_direct(980).await;

    let mut options = options_with_cooldown(Duration::from_secs(30));
    options.health = HealthCheckerConfig { batch_size: 1, ..HealthCheckerConfig::default() };

    let manager = two_provider_manager(&mock1.url(), &mock2.url(), options).await;

    manager.probe_now().await;
    assert_eq!(manager.health().tips().highest(Network::Testnet), 1000);

    // A second sweep seeing only the laggard does not regress the tip
    manager.probe_now().await;
    assert_eq!(manager.health().tips().highest(Network::Testnet), 1000);
}

#[tokio::test]
async fn test_offline_provider_stays_excluded_until_cooldown() {
    let mut mock1 = TonRpcMock::new().await;
    mock1.mock_status(404, "not found").await;
    let mut mock2 = TonRpcMock::new().await;
    mock2.mock_direct(1000).await;

    let manager = two_provider_manager(
        &mock1.url(),
        &mock2.url(),
        options_with_cooldown(Duration::from_secs(30)),
    )
    .await;
    manager.probe_now().await;

    let p1 = manager.health().get("p1", Network::Testnet).unwrap();
    assert_eq!(p1.status, HealthStatus::Offline);
    assert!(!p1.success);

    for _ in 0..3 {
        let url = manager.resolve_endpoint().await;
        assert!(url.starts_with(&mock2.url()), "offline provider selected: {url}");
    }
}
