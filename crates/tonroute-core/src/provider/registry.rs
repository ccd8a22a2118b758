//! Provider registry: resolved, immutable runtime views over configuration.
//!
//! The registry owns [`ResolvedProvider`] records built from declarative
//! [`ProviderConfig`](crate::config::ProviderConfig) entries plus an
//! environment snapshot. Records are immutable after construction; a config
//! reload atomically swaps the whole map so readers observe either the old
//! or the new registry, never a mix.

use crate::{
    config::{NetworkDefaults, ProvidersConfig},
    provider::{errors::ProviderError, family::ProviderType},
    types::{ApiVersion, Network},
};
use arc_swap::ArcSwap;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::warn;

/// Literal token replaced by the `key_env_name` value in endpoint templates.
pub const KEY_TOKEN: &str = "{key}";

/// Owned snapshot of environment variables used for `{key}` substitution.
///
/// Captured by the caller so resolution stays pure and tests never touch
/// process state.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot(HashMap<String, String>);

impl EnvSnapshot {
    /// Captures the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self(std::env::vars().collect())
    }

    /// Empty snapshot: every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A provider with environment secrets materialized and templates expanded.
///
/// Treated as immutable after construction; config reloads build fresh
/// records rather than mutating these.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub id: String,
    pub display_name: String,
    pub provider_type: ProviderType,
    pub network: Network,
    /// Endpoint URLs with `{key}` substituted where the env value existed.
    pub endpoints: BTreeMap<ApiVersion, String>,
    /// Header credential materialized from `api_key_env_name`.
    pub api_key: Option<String>,
    pub rps: u32,
    pub priority: u32,
    pub enabled: bool,
    pub is_dynamic: bool,
    pub browser_compatible: bool,
}

impl ResolvedProvider {
    fn resolve(id: &str, config: &crate::config::ProviderConfig, env: &EnvSnapshot) -> Self {
        let key = config.key_env_name.as_deref().and_then(|name| {
            let value = env.get(name);
            if value.is_none() {
                warn!(provider = %id, env_var = %name, "key env var not set; endpoint keeps its placeholder");
            }
            value
        });

        let endpoints = config
            .endpoints
            .iter()
            .map(|(version, template)| {
                let url = match (template.contains(KEY_TOKEN), key) {
                    (true, Some(key)) => template.replace(KEY_TOKEN, key),
                    _ => template.clone(),
                };
                (*version, url)
            })
            .collect();

        let api_key = config.api_key_env_name.as_deref().and_then(|name| {
            let value = env.get(name);
            if value.is_none() {
                warn!(provider = %id, env_var = %name, "api key env var not set");
            }
            value.map(ToString::to_string)
        });

        let display_name = if config.display_name.is_empty() {
            id.to_string()
        } else {
            config.display_name.clone()
        };

        Self {
            id: id.to_string(),
            display_name,
            provider_type: config.provider_type,
            network: config.network,
            endpoints,
            api_key,
            rps: config.rps.max(1),
            priority: config.priority,
            enabled: config.enabled,
            is_dynamic: config.is_dynamic || config.provider_type.is_dynamic_by_default(),
            browser_compatible: config.browser_compatible_or_default(),
        }
    }

    /// The endpoint a probe targets: v2 first, then v3, then v4.
    #[must_use]
    pub fn primary_endpoint(&self) -> Option<&str> {
        ApiVersion::HTTP
            .iter()
            .find_map(|version| self.endpoints.get(version))
            .map(String::as_str)
    }

    /// Whether a header credential is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Probe-time invariant: at least one HTTP endpoint free of unresolved
    /// `{key}` tokens, or a dynamic provider whose real endpoint comes from
    /// discovery.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::UnresolvedKey`] when every endpoint still carries
    ///   the placeholder
    /// - [`ProviderError::MissingCredentials`] when the family mandates a
    ///   header credential that is absent
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.provider_type.requires_api_key() && self.api_key.is_none() {
            return Err(ProviderError::MissingCredentials(format!(
                "{} requires an api key (set api_key_env_name)",
                self.provider_type
            )));
        }

        if self.is_dynamic {
            return Ok(());
        }

        let usable = ApiVersion::HTTP
            .iter()
            .filter_map(|version| self.endpoints.get(version))
            .any(|url| !url.contains(KEY_TOKEN));
        if usable {
            Ok(())
        } else {
            Err(ProviderError::UnresolvedKey(self.id.clone()))
        }
    }
}

/// Stateless view over the resolved configuration.
///
/// Lookups are lock-free; [`ProviderRegistry::reload`] swaps the whole map
/// atomically.
pub struct ProviderRegistry {
    providers: ArcSwap<HashMap<String, Arc<ResolvedProvider>>>,
    defaults: ArcSwap<NetworkDefaults>,
}

impl ProviderRegistry {
    /// Builds the registry by resolving every configured provider against
    /// the environment snapshot.
    #[must_use]
    pub fn new(config: &ProvidersConfig, env: &EnvSnapshot) -> Self {
        let registry = Self {
            providers: ArcSwap::from_pointee(HashMap::new()),
            defaults: ArcSwap::from_pointee(NetworkDefaults::default()),
        };
        registry.reload(config, env);
        registry
    }

    /// Re-resolves the registry from a new config. Atomic swap: readers see
    /// either the previous or the new map.
    pub fn reload(&self, config: &ProvidersConfig, env: &EnvSnapshot) {
        let providers: HashMap<_, _> = config
            .providers
            .iter()
            .map(|(id, provider_config)| {
                (id.clone(), Arc::new(ResolvedProvider::resolve(id, provider_config, env)))
            })
            .collect();

        self.providers.store(Arc::new(providers));
        self.defaults.store(Arc::new(config.defaults.clone()));
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ResolvedProvider>> {
        self.providers.load().get(id).map(Arc::clone)
    }

    /// Enabled providers serving `network`, ordered by (priority, id).
    #[must_use]
    pub fn for_network(&self, network: Network) -> Vec<Arc<ResolvedProvider>> {
        let mut providers: Vec<_> = self
            .providers
            .load()
            .values()
            .filter(|p| p.enabled && p.network == network)
            .map(Arc::clone)
            .collect();
        providers.sort_by(|a, b| (a.priority, &a.id).cmp(&(b.priority, &b.id)));
        providers
    }

    /// The declared default-order list for `network`.
    #[must_use]
    pub fn default_order(&self, network: Network) -> Vec<String> {
        self.defaults.load().for_network(network).to_vec()
    }

    /// All provider ids, for state views.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.providers.load().keys().cloned().collect();
        ids.sort();
        ids
    }
}
