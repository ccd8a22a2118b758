//! Shared builders for scenario tests.

use std::collections::BTreeMap;
use tonroute_core::{
    config::{NetworkDefaults, ProviderConfig, ProvidersConfig},
    provider::ProviderType,
    types::{ApiVersion, Network},
};

/// A testnet provider entry pointing at a mock server base URL.
#[must_use]
pub fn provider_entry(
    url: &str,
    provider_type: ProviderType,
    priority: u32,
    rps: u32,
) -> ProviderConfig {
    ProviderConfig {
        display_name: String::new(),
        provider_type,
        network: Network::Testnet,
        endpoints: BTreeMap::from([(ApiVersion::V2, url.to_string())]),
        key_env_name: None,
        api_key_env_name: None,
        rps,
        priority,
        enabled: true,
        is_dynamic: false,
        browser_compatible: None,
    }
}

/// A full config whose testnet default order follows the entry order.
#[must_use]
pub fn config_of(entries: Vec<(&str, ProviderConfig)>) -> ProvidersConfig {
    let default_order: Vec<String> = entries.iter().map(|(id, _)| (*id).to_string()).collect();

    let mut providers = BTreeMap::new();
    for (id, entry) in entries {
        providers.insert(id.to_string(), entry);
    }

    ProvidersConfig {
        version: "1".to_string(),
        providers,
        defaults: NetworkDefaults { testnet: default_order, mainnet: Vec::new() },
    }
}
