//! Selection overrides end-to-end: custom-endpoint bypass, manual
//! pinning, and browser-mode filtering.

use crate::mock_infrastructure::{
    test_helpers::{config_of, provider_entry},
    TonRpcMock,
};
use std::sync::Arc;
use tonroute_core::{
    provider::{EnvSnapshot, ManagerOptions, ProviderManager, ProviderType},
    types::{Network, RuntimeAdapter},
};

#[tokio::test]
async fn test_custom_endpoint_bypasses_probes_entirely() {
    let mut mock = TonRpcMock::new().await;
    mock.mock_status(503, "service unavailable").await;

    let config = config_of(vec![(
        "p1",
        provider_entry(&mock.url(), ProviderType::Custom, 10, 10),
    )]);
    let manager = ProviderManager::new(
        &config,
        &EnvSnapshot::empty(),
        ManagerOptions::new(Network::Testnet),
    )
    .unwrap();

    manager.set_custom_endpoint(Some("https://my.proxy/api/v2/jsonRPC"));

    // Probes run and fail, but the custom endpoint is unaffected
    manager.probe_now().await;

    for _ in 0..3 {
        let url = manager.resolve_endpoint().await;
        assert_eq!(url, "https://my.proxy/api/v2/jsonRPC");
    }

    let active = manager.active_provider_info().unwrap();
    assert!(active.is_custom);
    assert_eq!(active.id, "custom");
    assert!(manager.is_using_custom_endpoint());

    // Clearing the override returns selection to the registry
    manager.set_custom_endpoint(None);
    assert!(!manager.is_using_custom_endpoint());
}

#[tokio::test]
async fn test_manual_pin_overrides_scoring() {
    let mut mock1 = TonRpcMock::new().await;
    mock1.mock_direct(1000).await;
    let mut mock2 = TonRpcMock::new().await;
    mock2.mock_direct(1000).await;

    let config = config_of(vec![
        ("fast", provider_entry(&mock1.url(), ProviderType::Custom, 0, 10)),
        ("slow", provider_entry(&mock2.url(), ProviderType::Custom, 50, 10)),
    ]);
    let manager = ProviderManager::new(
        &config,
        &EnvSnapshot::empty(),
        ManagerOptions::new(Network::Testnet),
    )
    .unwrap();
    manager.probe_now().await;

    assert!(manager.resolve_endpoint().await.starts_with(&mock1.url()));

    manager.set_selected_provider(Some("slow"));
    assert_eq!(manager.selected_provider_id().as_deref(), Some("slow"));
    assert!(manager.resolve_endpoint().await.starts_with(&mock2.url()));

    // Re-enabling auto-select clears the pin
    manager.set_auto_select(true);
    assert!(manager.selected_provider_id().is_none());
    assert!(manager.resolve_endpoint().await.starts_with(&mock1.url()));
}

#[tokio::test]
async fn test_browser_mode_filters_incompatible_providers() {
    let mut closed_mock = TonRpcMock::new().await;
    closed_mock.mock_direct(1000).await;
    let mut cors_mock = TonRpcMock::new().await;
    cors_mock.mock_status(400, "request blocked by CORS policy").await;
    let mut open_mock = TonRpcMock::new().await;
    open_mock.mock_direct(1000).await;

    let mut closed = provider_entry(&closed_mock.url(), ProviderType::Custom, 0, 10);
    closed.browser_compatible = Some(false);

    let config = config_of(vec![
        ("closed", closed),
        ("cors", provider_entry(&cors_mock.url(), ProviderType::Custom, 1, 10)),
        ("open", provider_entry(&open_mock.url(), ProviderType::Custom, 20, 10)),
    ]);

    let mut options = ManagerOptions::new(Network::Testnet);
    options.adapter = RuntimeAdapter::Browser;
    let manager = ProviderManager::new(&config, &EnvSnapshot::empty(), options).unwrap();

    manager.probe_now().await;

    // "closed" is config-excluded, "cors" flipped during probing: only
    // "open" remains selectable despite its worse priority
    let cors_health = manager.health().get("cors", Network::Testnet).unwrap();
    assert!(!cors_health.browser_compatible);

    let url = manager.resolve_endpoint().await;
    assert!(url.starts_with(&open_mock.url()), "got {url}");
}

#[tokio::test]
async fn test_dynamic_provider_resolves_through_discovery() {
    let mut gateway = TonRpcMock::new().await;
    gateway.mock_direct(1000).await;

    // Discovery service hands out the gateway URL
    let mut discovery_mock = TonRpcMock::new().await;
    discovery_mock.mock_discovery(&format!("{}/api/v2", gateway.url())).await;

    let mut dynamic = provider_entry("https://static.example/api/v2", ProviderType::Orbs, 0, 10);
    dynamic.is_dynamic = true;

    let config = config_of(vec![("orbs", dynamic)]);
    let registry = Arc::new(tonroute_core::provider::ProviderRegistry::new(
        &config,
        &EnvSnapshot::empty(),
    ));

    let http = Arc::new(tonroute_core::provider::HttpClient::new().unwrap());
    let discovery = tonroute_core::provider::EndpointDiscovery::with_base_url(
        Arc::clone(&http),
        format!("{}/nodes", discovery_mock.url()),
    );

    let provider = registry.get("orbs").unwrap();
    let discovered = discovery
        .discover_or_fallback(Network::Testnet, provider.primary_endpoint().unwrap())
        .await;
    assert_eq!(discovered, format!("{}/api/v2", gateway.url()));

    // Discovery failure falls back to the configured static endpoint
    let dead_discovery = tonroute_core::provider::EndpointDiscovery::with_base_url(
        http,
        "http://127.0.0.1:1/nodes".to_string(),
    );
    let fallback = dead_discovery
        .discover_or_fallback(Network::Testnet, provider.primary_endpoint().unwrap())
        .await;
    assert_eq!(fallback, "https://static.example/api/v2");
}
