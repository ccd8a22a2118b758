use tonroute_core::{
    config::ProvidersConfig,
    provider::{EnvSnapshot, ManagerOptions, ProviderManager},
    types::Network,
};

/// Runs one full health sweep and prints per-provider results.
pub async fn probe(network: Network) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProvidersConfig::load()?;
    let manager = ProviderManager::new(
        &config,
        &EnvSnapshot::from_process(),
        ManagerOptions::new(network),
    )?;

    println!("probing {} providers on {network}...", manager.registry().for_network(network).len());
    manager.probe_now().await;

    println!(
        "{:<24} {:<10} {:>10} {:>12} {:>8}  {}",
        "ID", "STATUS", "LATENCY", "SEQNO", "BEHIND", "ERROR"
    );
    for provider in manager.registry().for_network(network) {
        let Some(health) = manager.health().get(&provider.id, network) else {
            continue;
        };

        let latency = health
            .latency_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms"));
        let seqno = health
            .seqno
            .map_or_else(|| "-".to_string(), |seqno| seqno.to_string());

        println!(
            "{:<24} {:<10} {:>10} {:>12} {:>8}  {}",
            provider.id,
            health.status.to_string(),
            latency,
            seqno,
            health.blocks_behind,
            health.error.unwrap_or_default()
        );
    }

    println!(
        "highest seqno on {network}: {}",
        manager.health().tips().highest(network)
    );
    Ok(())
}
