use tonroute_core::{
    config::ProvidersConfig,
    provider::{EnvSnapshot, ProviderRegistry},
    types::{ApiVersion, Network},
};

/// Lists resolved providers for `network`.
pub async fn providers(network: Network) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProvidersConfig::load()?;
    let registry = ProviderRegistry::new(&config, &EnvSnapshot::from_process());

    let resolved = registry.for_network(network);
    if resolved.is_empty() {
        println!("no enabled providers for {network}");
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:>8} {:>6}  {:<10} {}",
        "ID", "TYPE", "PRIORITY", "RPS", "KEY", "ENDPOINT (v2/v3/v4)"
    );
    for provider in resolved {
        let key_status = match (&provider.api_key, provider.validate()) {
            (_, Err(error)) => format!("invalid: {error}"),
            (Some(_), Ok(())) => "header".to_string(),
            (None, Ok(())) => "none".to_string(),
        };

        let endpoints: Vec<String> = ApiVersion::HTTP
            .iter()
            .filter_map(|version| {
                provider.endpoints.get(version).map(|url| format!("{version}={url}"))
            })
            .collect();

        println!(
            "{:<24} {:<12} {:>8} {:>6}  {:<10} {}",
            provider.id,
            provider.provider_type.to_string(),
            provider.priority,
            provider.rps,
            key_status,
            endpoints.join(" ")
        );
    }

    Ok(())
}
