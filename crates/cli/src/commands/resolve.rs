use std::time::Duration;
use tonroute_core::{
    config::ProvidersConfig,
    provider::{EnvSnapshot, ManagerOptions, ProviderManager},
    types::Network,
};

pub struct ResolveOptions {
    pub rate_limit: bool,
    pub timeout_ms: u64,
}

/// Prints the endpoint the manager would hand out for `network`.
pub async fn resolve(
    network: Network,
    options: ResolveOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProvidersConfig::load()?;
    let manager = ProviderManager::new(
        &config,
        &EnvSnapshot::from_process(),
        ManagerOptions::new(network),
    )?;

    if options.rate_limit {
        let resolved = manager
            .resolve_endpoint_with_rate_limit(Some(Duration::from_millis(options.timeout_ms)))
            .await;
        println!("{}", resolved.url);
        match resolved.provider_id {
            Some(provider_id) => eprintln!("provider: {provider_id} (token acquired)"),
            None => eprintln!("fallback endpoint (no token acquired)"),
        }
    } else {
        let url = manager.resolve_endpoint().await;
        println!("{url}");
        if let Some(active) = manager.active_provider_info() {
            eprintln!("provider: {}", active.id);
        } else {
            eprintln!("fallback endpoint");
        }
    }

    Ok(())
}
