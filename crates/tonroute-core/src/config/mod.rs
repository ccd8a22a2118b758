//! Provider configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: the built-in public provider set
//! 2. **Config file**: TOML file specified by `TONROUTE_CONFIG` env var
//! 3. **Environment variables**: `TONROUTE__*` env vars override fields
//!
//! # Schema
//!
//! ```toml
//! version = "1"
//!
//! [providers.toncenter-mainnet]
//! display_name = "TON Center"
//! type = "toncenter"
//! network = "mainnet"
//! key_env_name = "TONCENTER_KEY"
//! rps = 10
//! priority = 0
//!
//! [providers.toncenter-mainnet.endpoints]
//! v2 = "https://toncenter.com/api/v2?api_key={key}"
//!
//! [defaults]
//! mainnet = ["toncenter-mainnet"]
//! testnet = []
//! ```
//!
//! # Validation
//!
//! [`ProvidersConfig::validate`] walks the whole document and collects
//! *every* offending path into a single [`ConfigError::Invalid`] instead of
//! failing on the first problem.

use crate::{
    provider::family::ProviderType,
    types::{ApiVersion, Network},
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use thiserror::Error;

/// Errors surfaced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read, parsed, or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The document parsed but violates schema constraints. Every offending
    /// path is listed.
    #[error("invalid configuration ({} issue(s)): {}", .issues.len(), .issues.join("; "))]
    Invalid { issues: Vec<String> },
}

/// Declarative description of a single RPC provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Human-readable name for logs and state views. Falls back to the
    /// provider id when empty.
    #[serde(default)]
    pub display_name: String,

    /// Provider family deciding endpoint shape, auth convention, and
    /// response envelope.
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    /// Network this endpoint serves.
    pub network: Network,

    /// URL templates per API version. Templates may contain the literal
    /// token `{key}`, substituted from `key_env_name` at resolve time.
    pub endpoints: BTreeMap<ApiVersion, String>,

    /// Environment variable whose value replaces `{key}` in templates.
    #[serde(default)]
    pub key_env_name: Option<String>,

    /// Environment variable providing the header credential (distinct from
    /// `{key}` substitution).
    #[serde(default)]
    pub api_key_env_name: Option<String>,

    /// Declared sustainable requests per second. Defaults to `1`.
    #[serde(default = "default_rps")]
    pub rps: u32,

    /// Selection priority, lower is preferred. Defaults to `10`.
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Whether this provider participates in selection. Defaults to `true`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether the real endpoint must be discovered at runtime (Orbs).
    #[serde(default)]
    pub is_dynamic: bool,

    /// Whether the endpoint accepts cross-origin requests. Treated as
    /// `true` when absent.
    #[serde(default)]
    pub browser_compatible: Option<bool>,
}

fn default_rps() -> u32 {
    1
}

fn default_priority() -> u32 {
    10
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Effective browser-compatibility flag (`true` when unset).
    #[must_use]
    pub fn browser_compatible_or_default(&self) -> bool {
        self.browser_compatible.unwrap_or(true)
    }
}

/// Default provider ordering per network, used as the selector's fallback
/// ladder when scoring produces no positive candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkDefaults {
    #[serde(default)]
    pub testnet: Vec<String>,
    #[serde(default)]
    pub mainnet: Vec<String>,
}

impl NetworkDefaults {
    #[must_use]
    pub fn for_network(&self, network: Network) -> &[String] {
        match network {
            Network::Testnet => &self.testnet,
            Network::Mainnet => &self.mainnet,
        }
    }
}

/// Root provider configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Schema version tag.
    #[serde(default = "default_version")]
    pub version: String,

    /// Providers keyed by unique id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Default ordering per network.
    #[serde(default)]
    pub defaults: NetworkDefaults,
}

fn default_version() -> String {
    "1".to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();

        providers.insert(
            "toncenter-mainnet".to_string(),
            ProviderConfig {
                display_name: "TON Center".to_string(),
                provider_type: ProviderType::Toncenter,
                network: Network::Mainnet,
                endpoints: BTreeMap::from([(
                    ApiVersion::V2,
                    "https://toncenter.com/api/v2".to_string(),
                )]),
                key_env_name: Some("TONCENTER_MAINNET_KEY".to_string()),
                api_key_env_name: None,
                rps: 10,
                priority: 0,
                enabled: true,
                is_dynamic: false,
                browser_compatible: Some(true),
            },
        );
        providers.insert(
            "toncenter-testnet".to_string(),
            ProviderConfig {
                display_name: "TON Center Testnet".to_string(),
                provider_type: ProviderType::Toncenter,
                network: Network::Testnet,
                endpoints: BTreeMap::from([(
                    ApiVersion::V2,
                    "https://testnet.toncenter.com/api/v2".to_string(),
                )]),
                key_env_name: Some("TONCENTER_TESTNET_KEY".to_string()),
                api_key_env_name: None,
                rps: 10,
                priority: 0,
                enabled: true,
                is_dynamic: false,
                browser_compatible: Some(true),
            },
        );
        providers.insert(
            "orbs-mainnet".to_string(),
            ProviderConfig {
                display_name: "Orbs Access".to_string(),
                provider_type: ProviderType::Orbs,
                network: Network::Mainnet,
                endpoints: BTreeMap::from([(
                    ApiVersion::V2,
                    "https://ton.access.orbs.network/api/v2".to_string(),
                )]),
                key_env_name: None,
                api_key_env_name: None,
                rps: 10,
                priority: 5,
                enabled: true,
                is_dynamic: true,
                browser_compatible: Some(true),
            },
        );
        providers.insert(
            "orbs-testnet".to_string(),
            ProviderConfig {
                display_name: "Orbs Access Testnet".to_string(),
                provider_type: ProviderType::Orbs,
                network: Network::Testnet,
                endpoints: BTreeMap::from([(
                    ApiVersion::V2,
                    "https://ton.access.orbs.network/api/v2".to_string(),
                )]),
                key_env_name: None,
                api_key_env_name: None,
                rps: 10,
                priority: 5,
                enabled: true,
                is_dynamic: true,
                browser_compatible: Some(true),
            },
        );

        Self {
            version: default_version(),
            providers,
            defaults: NetworkDefaults {
                testnet: vec!["toncenter-testnet".to_string(), "orbs-testnet".to_string()],
                mainnet: vec!["toncenter-mainnet".to_string(), "orbs-mainnet".to_string()],
            },
        }
    }
}

impl ProvidersConfig {
    /// Loads configuration from a TOML file with environment overrides.
    ///
    /// Environment variables with the `TONROUTE__` prefix override any
    /// field, using `__` as the path separator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read or parsed,
    /// and [`ConfigError::Invalid`] if validation fails.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let parsed = Self::parse_file(config_path)?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn parse_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("TONROUTE").separator("__"))
            .build()?;

        Ok(builder.try_deserialize()?)
    }

    /// Loads configuration from `config/providers.toml` (overridable via
    /// the `TONROUTE_CONFIG` env var), falling back to the built-in
    /// provider set when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded,
    /// parsed, or validated.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("TONROUTE_CONFIG")
            .unwrap_or_else(|_| "config/providers.toml".to_string());

        let loaded = Self::parse_file(&config_path)?;
        let effective = if loaded.providers.is_empty() { Self::default() } else { loaded };
        effective.validate()?;
        Ok(effective)
    }

    /// Returns the ids of enabled providers on `network`, priority order.
    #[must_use]
    pub fn enabled_ids(&self, network: Network) -> Vec<String> {
        let mut ids: Vec<_> = self
            .providers
            .iter()
            .filter(|(_, p)| p.enabled && p.network == network)
            .map(|(id, p)| (p.priority, id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Validates the whole document, collecting every offending path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing each problem as
    /// `path: cause`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.providers.is_empty() {
            issues.push("providers: no providers configured".to_string());
        }

        for (id, provider) in &self.providers {
            let has_http_endpoint = ApiVersion::HTTP
                .iter()
                .any(|version| provider.endpoints.contains_key(version));
            if !has_http_endpoint {
                issues.push(format!(
                    "providers.{id}.endpoints: at least one of v2/v3/v4 is required"
                ));
            }

            for (version, url) in &provider.endpoints {
                let expected_scheme = if *version == ApiVersion::Ws { "ws" } else { "http" };
                if !url.starts_with(expected_scheme) {
                    issues.push(format!(
                        "providers.{id}.endpoints.{version}: URL must start with {expected_scheme}"
                    ));
                }
            }

            if provider.rps == 0 {
                issues.push(format!("providers.{id}.rps: must be a positive integer"));
            }
        }

        for network in [Network::Testnet, Network::Mainnet] {
            for (index, id) in self.defaults.for_network(network).iter().enumerate() {
                match self.providers.get(id) {
                    None => issues.push(format!(
                        "defaults.{network}[{index}]: unknown provider id \"{id}\""
                    )),
                    Some(provider) if provider.network != network => issues.push(format!(
                        "defaults.{network}[{index}]: provider \"{id}\" serves {}",
                        provider.network
                    )),
                    Some(_) => {}
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { issues })
        }
    }
}
