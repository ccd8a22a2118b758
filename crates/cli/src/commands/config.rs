use clap::Subcommand;
use tonroute_core::config::{ConfigError, ProvidersConfig};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the providers file and list every issue
    Validate,

    /// Print the effective configuration as JSON
    Show,
}

pub fn handle_config_command(command: ConfigCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ConfigCommands::Validate => match ProvidersConfig::load() {
            Ok(config) => {
                println!(
                    "configuration OK: {} provider(s), version {}",
                    config.providers.len(),
                    config.version
                );
                Ok(())
            }
            Err(ConfigError::Invalid { issues }) => {
                eprintln!("configuration invalid ({} issue(s)):", issues.len());
                for issue in issues {
                    eprintln!("  - {issue}");
                }
                std::process::exit(1);
            }
            Err(other) => Err(other.into()),
        },
        ConfigCommands::Show => {
            let config = ProvidersConfig::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
