//! Manager facade flows: caller-reported errors, hard-coded fallback,
//! state subscription, and lifecycle.

use crate::mock_infrastructure::{
    test_helpers::{config_of, provider_entry},
    TonRpcMock,
};
use std::{sync::Arc, time::Duration};
use tonroute_core::{
    config::ProvidersConfig,
    provider::{
        EnvSnapshot, HealthStatus, ManagerError, ManagerOptions, ProviderManager, ProviderType,
    },
    types::Network,
};

async fn manager_with_one_provider(mock: &TonRpcMock) -> Arc<ProviderManager> {
    let config = config_of(vec![(
        "p1",
        provider_entry(&mock.url(), ProviderType::Custom, 10, 10),
    )]);
    ProviderManager::new(
        &config,
        &EnvSnapshot::empty(),
        ManagerOptions::new(Network::Testnet),
    )
    .unwrap()
}

#[tokio::test]
async fn test_reported_errors_map_to_health_marks() {
    let cases = [
        ("429 Too Many Requests", HealthStatus::Degraded),
        ("rate limit exceeded", HealthStatus::Degraded),
        ("503 Service Unavailable", HealthStatus::Offline),
        ("502 Bad Gateway", HealthStatus::Offline),
        ("404 Not Found", HealthStatus::Offline),
        ("request timed out", HealthStatus::Offline),
        ("connection aborted", HealthStatus::Offline),
        ("some unrecognized failure", HealthStatus::Degraded),
    ];

    for (message, expected_status) in cases {
        let mut mock = TonRpcMock::new().await;
        mock.mock_direct(1000).await;
        let manager = manager_with_one_provider(&mock).await;
        manager.probe_now().await;

        let _ = manager.resolve_endpoint().await;
        manager.report_error(message);

        let health = manager.health().get("p1", Network::Testnet).unwrap();
        assert_eq!(health.status, expected_status, "message: {message}");
        assert!(!health.success, "message: {message}");
        assert_eq!(health.error.as_deref(), Some(message));
    }
}

#[tokio::test]
async fn test_fallback_url_when_all_providers_are_down() {
    let mut mock = TonRpcMock::new().await;
    mock.mock_status(503, "service unavailable").await;

    let manager = manager_with_one_provider(&mock).await;
    manager.probe_now().await;

    let url = manager.resolve_endpoint().await;
    assert_eq!(url, "https://testnet.toncenter.com/api/v2/jsonRPC");
    assert!(manager.active_provider_info().is_none());

    // Reports with no active provider are no-ops
    manager.report_error("anything");
    manager.report_success();
}

#[tokio::test]
async fn test_snapshot_carries_health_and_rate_limit_views() {
    let mut mock = TonRpcMock::new().await;
    mock.mock_direct(1234).await;

    let manager = manager_with_one_provider(&mock).await;
    let mut receiver = manager.subscribe();

    manager.probe_now().await;
    receiver.changed().await.unwrap();

    let snapshot = receiver.borrow().clone();
    assert_eq!(snapshot.network, Network::Testnet);
    assert!(snapshot.initialized);
    assert!(!snapshot.is_testing);

    let view = snapshot.providers.get("p1").expect("provider view present");
    let health = view.health.as_ref().expect("health recorded");
    assert!(health.success);
    assert_eq!(health.seqno, Some(1234));

    let rate_limit = view.rate_limit.as_ref().expect("rate limit view present");
    assert_eq!(rate_limit.consecutive_errors, 0);
    assert!(rate_limit.tokens > 0.0);
}

#[tokio::test]
async fn test_rate_limited_resolution_consumes_a_token() {
    let mut mock = TonRpcMock::new().await;
    mock.mock_direct(1000).await;

    let manager = manager_with_one_provider(&mock).await;
    manager.probe_now().await;

    let before = manager.limiters().get("p1").unwrap().snapshot().tokens;
    let resolved = manager
        .resolve_endpoint_with_rate_limit(Some(Duration::from_secs(1)))
        .await;
    assert!(resolved.acquired);
    assert_eq!(resolved.provider_id.as_deref(), Some("p1"));

    let after = manager.limiters().get("p1").unwrap().snapshot().tokens;
    assert!(after < before, "token not consumed: {before} -> {after}");
}

#[tokio::test]
async fn test_config_reload_swaps_providers() {
    let mut first = TonRpcMock::new().await;
    first.mock_direct(1000).await;
    let mut second = TonRpcMock::new().await;
    second.mock_direct(1000).await;

    let manager = manager_with_one_provider(&first).await;
    manager.probe_now().await;
    assert!(manager.resolve_endpoint().await.starts_with(&first.url()));

    let new_config = config_of(vec![(
        "p2",
        provider_entry(&second.url(), ProviderType::Custom, 5, 10),
    )]);
    manager.update_config(&new_config, &EnvSnapshot::empty()).unwrap();

    assert!(manager.registry().get("p1").is_none());
    manager.probe_now().await;
    assert!(manager.resolve_endpoint().await.starts_with(&second.url()));
}

#[tokio::test]
async fn test_config_reload_rejects_invalid_documents() {
    let mut mock = TonRpcMock::new().await;
    mock.mock_direct(1000).await;

    let manager = manager_with_one_provider(&mock).await;

    let mut bad = ProvidersConfig::default();
    bad.defaults.testnet.push("missing".to_string());
    assert!(manager.update_config(&bad, &EnvSnapshot::empty()).is_err());

    // The previous registry is untouched
    assert!(manager.registry().get("p1").is_some());
}

#[tokio::test]
async fn test_global_accessor_lifecycle() {
    // Not initialized yet for mainnet in this process
    let err = ProviderManager::global(Network::Mainnet)
        .err()
        .expect("global accessor should fail before init");
    assert!(matches!(err, ManagerError::NotInitialized(Network::Mainnet)));

    let mut mock = TonRpcMock::new().await;
    mock.mock_direct(1000).await;
    let mut config = config_of(vec![(
        "p1",
        provider_entry(&mock.url(), ProviderType::Custom, 10, 10),
    )]);
    // Re-home the provider to mainnet for the global slot
    config.providers.get_mut("p1").unwrap().network = Network::Mainnet;
    config.defaults.mainnet = vec!["p1".to_string()];
    config.defaults.testnet.clear();

    let first = ProviderManager::init_global(
        &config,
        &EnvSnapshot::empty(),
        ManagerOptions::new(Network::Mainnet),
    )
    .await
    .unwrap();

    // Idempotent: a second init returns the same instance
    let second = ProviderManager::init_global(
        &config,
        &EnvSnapshot::empty(),
        ManagerOptions::new(Network::Mainnet),
    )
    .await
    .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let fetched = ProviderManager::global(Network::Mainnet).unwrap();
    assert!(Arc::ptr_eq(&first, &fetched));

    first.destroy();
}

#[tokio::test]
async fn test_background_prober_runs_and_stops() {
    let mut mock = TonRpcMock::new().await;
    mock.mock_direct(1000).await;

    let config = config_of(vec![(
        "p1",
        provider_entry(&mock.url(), ProviderType::Custom, 10, 10),
    )]);
    let mut options = ManagerOptions::new(Network::Testnet);
    options.probe_on_start = true;
    options.probe_interval = Some(Duration::from_millis(100));

    let manager = ProviderManager::new(&config, &EnvSnapshot::empty(), options).unwrap();
    manager.start().await;

    // The startup sweep already recorded health
    assert!(manager.health().get("p1", Network::Testnet).unwrap().success);

    // Let the ticker run at least once more, then stop it
    tokio::time::sleep(Duration::from_millis(250)).await;
    manager.destroy();

    let tested_at = manager
        .health()
        .get("p1", Network::Testnet)
        .unwrap()
        .last_tested
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let tested_after = manager
        .health()
        .get("p1", Network::Testnet)
        .unwrap()
        .last_tested
        .unwrap();
    assert_eq!(tested_at, tested_after, "probing continued after destroy");
}
