use clap::{Parser, Subcommand};

mod commands;
use commands::{handle_config_command, probe, providers, resolve, ConfigCommands, ResolveOptions};

use tonroute_core::types::Network;

#[derive(Parser)]
#[command(name = "tonroute")]
#[command(about = "tonroute CLI - inspect, probe, and resolve TON RPC providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the providers config file (defaults to config/providers.toml,
    /// overridable via TONROUTE_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Target network
    #[arg(long, global = true, default_value = "mainnet")]
    network: Network,
}

#[derive(Subcommand)]
enum Commands {
    /// List resolved providers for the network
    Providers,

    /// Run one full health sweep and print per-provider results
    Probe,

    /// Print the endpoint the manager would hand out
    Resolve {
        /// Also acquire a rate-limit token on the chosen provider
        #[arg(long)]
        rate_limit: bool,

        /// Token acquisition deadline in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        std::env::set_var("TONROUTE_CONFIG", path);
    }

    match cli.command {
        Commands::Providers => providers(cli.network).await?,
        Commands::Probe => probe(cli.network).await?,
        Commands::Resolve { rate_limit, timeout_ms } => {
            resolve(cli.network, ResolveOptions { rate_limit, timeout_ms }).await?;
        }
        Commands::Config(config_command) => handle_config_command(config_command)?,
    }

    Ok(())
}
