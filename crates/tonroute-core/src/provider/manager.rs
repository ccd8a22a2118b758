//! The manager facade: one object composing registry, health checker,
//! rate limiters, and selector.
//!
//! The manager owns no routing logic of its own - it wires the components
//! together, classifies caller-reported errors, and broadcasts state
//! snapshots to subscribers through a `watch` channel. Request execution
//! stays with the caller: `resolve_endpoint` hands out a URL, the caller
//! runs the request, then reports success or failure back.

use super::{
    discovery::EndpointDiscovery,
    errors::ErrorClass,
    health::{HealthChecker, HealthCheckerConfig, HealthResult},
    http_client::HttpClient,
    normalize::normalize_endpoint,
    ratelimit::{RateLimitConfig, RateLimiterPool, RateLimitSnapshot},
    registry::{EnvSnapshot, ProviderRegistry, ResolvedProvider},
    selector::{ProviderSelector, SelectorConfig},
};
use crate::{
    chain::ChainTips,
    config::{ConfigError, ProvidersConfig},
    types::{Network, RuntimeAdapter},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Errors surfaced by the manager facade.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The process-wide accessor was used before a successful init.
    #[error("provider manager not initialized for {0}")]
    NotInitialized(Network),

    /// Configuration was rejected at init; the manager stays uninitialized.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Manager construction options.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub network: Network,
    pub adapter: RuntimeAdapter,
    /// Run a full probe sweep from `start()`.
    pub probe_on_start: bool,
    /// Periodic background probing; `None` disables the ticker.
    pub probe_interval: Option<Duration>,
    pub health: HealthCheckerConfig,
    pub selector: SelectorConfig,
    /// Default deadline for `resolve_endpoint_with_rate_limit`.
    pub acquire_timeout: Duration,
}

impl ManagerOptions {
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self {
            network,
            adapter: RuntimeAdapter::Server,
            probe_on_start: false,
            probe_interval: None,
            health: HealthCheckerConfig::default(),
            selector: SelectorConfig::default(),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// The provider a caller's next request should run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProviderInfo {
    pub id: String,
    pub network: Network,
    pub endpoint: String,
    pub is_custom: bool,
}

/// Result of a rate-limited resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: String,
    /// `None` when the hard-coded public fallback was handed out.
    pub provider_id: Option<String>,
    /// Whether a token was consumed on the chosen provider.
    pub acquired: bool,
}

/// Per-provider slice of the emitted state.
#[derive(Debug, Clone)]
pub struct ProviderStateView {
    pub health: Option<HealthResult>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Snapshot pushed to subscribers after init, probe sweeps, explicit
/// marks, and override changes.
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    pub network: Network,
    pub initialized: bool,
    pub is_testing: bool,
    pub providers: HashMap<String, ProviderStateView>,
    pub best_provider_id: Option<String>,
    pub selected_provider_id: Option<String>,
    pub auto_select: bool,
    pub custom_endpoint: Option<String>,
}

/// Thin orchestrator over the four core components.
pub struct ProviderManager {
    options: ManagerOptions,
    registry: Arc<ProviderRegistry>,
    limiters: Arc<RateLimiterPool>,
    health: Arc<HealthChecker>,
    selector: Arc<ProviderSelector>,
    discovery: Arc<EndpointDiscovery>,
    active: Mutex<Option<ActiveProviderInfo>>,
    state_tx: Arc<watch::Sender<ManagerSnapshot>>,
    shutdown_tx: broadcast::Sender<()>,
    probe_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    started: AtomicBool,
}

impl ProviderManager {
    /// Builds a manager from validated configuration.
    ///
    /// Pre-configures a rate limiter for every resolved provider on the
    /// target network, sized from its declared RPS.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] (listing every offending path) when
    /// the configuration is rejected; the manager is not constructed.
    pub fn new(
        config: &ProvidersConfig,
        env: &EnvSnapshot,
        options: ManagerOptions,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::new(config, env));
        let limiters = Arc::new(RateLimiterPool::new());
        let http = Arc::new(HttpClient::new().map_err(|e| ConfigError::Invalid {
            issues: vec![format!("http client: {e}")],
        })?);
        let discovery = Arc::new(EndpointDiscovery::new(Arc::clone(&http)));
        let tips = Arc::new(ChainTips::new());
        let health = Arc::new(HealthChecker::new(
            http,
            Arc::clone(&discovery),
            Arc::clone(&limiters),
            tips,
            options.health.clone(),
        ));
        let selector = Arc::new(ProviderSelector::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            options.adapter,
            options.selector.clone(),
        ));

        for provider in registry.for_network(options.network) {
            limiters.configure(&provider.id, RateLimitConfig::from_rps(provider.rps));
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let initial = ManagerSnapshot {
            network: options.network,
            initialized: true,
            is_testing: false,
            providers: HashMap::new(),
            best_provider_id: None,
            selected_provider_id: None,
            auto_select: true,
            custom_endpoint: None,
        };
        let (state_tx, _) = watch::channel(initial);

        let manager = Arc::new(Self {
            options,
            registry,
            limiters,
            health,
            selector,
            discovery,
            active: Mutex::new(None),
            state_tx: Arc::new(state_tx),
            shutdown_tx,
            probe_task: Mutex::new(None),
            started: AtomicBool::new(false),
        });
        manager.emit_state();

        info!(network = %manager.options.network, "provider manager initialized");
        Ok(manager)
    }

    /// Convenience constructor with custom components left at defaults.
    ///
    /// # Errors
    ///
    /// See [`ProviderManager::new`].
    pub fn with_defaults(network: Network) -> Result<Arc<Self>, ConfigError> {
        Self::new(
            &ProvidersConfig::default(),
            &EnvSnapshot::from_process(),
            ManagerOptions::new(network),
        )
    }

    /// Runs the optional startup probe sweep and spawns the background
    /// prober. Idempotent: later calls are no-ops.
    ///
    /// The spawned task holds the components, not the manager itself, so
    /// dropping every handle to the manager still tears it down.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.options.probe_on_start {
            self.probe_now().await;
        }

        if let Some(interval) = self.options.probe_interval {
            let network = self.options.network;
            let registry = Arc::clone(&self.registry);
            let health = Arc::clone(&self.health);
            let selector = Arc::clone(&self.selector);
            let limiters = Arc::clone(&self.limiters);
            let state_tx = Arc::clone(&self.state_tx);
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // The first tick fires immediately; the startup sweep covered it.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let providers = registry.for_network(network);
                            health.probe_all(&providers).await;
                            emit_snapshot(network, &registry, &health, &selector, &limiters, &state_tx);
                        }
                        _ = shutdown_rx.recv() => {
                            info!("background prober shutting down");
                            break;
                        }
                    }
                }
            });
            *self.probe_task.lock() = Some(handle);
        }
    }

    /// Probes every enabled provider on this network once and emits state.
    pub async fn probe_now(&self) {
        let providers = self.registry.for_network(self.options.network);
        self.health.probe_all(&providers).await;
        self.emit_state();
    }

    /// Replaces the configuration, re-resolves the registry, and re-emits
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] and leaves the previous registry in
    /// place when the new document fails validation.
    pub fn update_config(
        &self,
        config: &ProvidersConfig,
        env: &EnvSnapshot,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        self.registry.reload(config, env);
        for provider in self.registry.for_network(self.options.network) {
            self.limiters.configure(&provider.id, RateLimitConfig::from_rps(provider.rps));
        }
        self.selector.invalidate(self.options.network);
        self.emit_state();
        Ok(())
    }

    /// Resolves the endpoint URL the caller's next request should target.
    ///
    /// No rate-limit token is acquired. When nothing is selectable the
    /// hard-coded per-network public endpoint is returned.
    pub async fn resolve_endpoint(&self) -> String {
        if let Some(custom) = self.selector.custom_endpoint() {
            *self.active.lock() = Some(ActiveProviderInfo {
                id: "custom".to_string(),
                network: self.options.network,
                endpoint: custom.clone(),
                is_custom: true,
            });
            return custom;
        }

        match self.selector.get_best_provider(self.options.network) {
            Some(provider) => self.endpoint_for(&provider).await,
            None => {
                warn!(
                    network = %self.options.network,
                    "no provider selectable; using public fallback endpoint"
                );
                *self.active.lock() = None;
                self.options.network.public_fallback_url().to_string()
            }
        }
    }

    /// Resolves an endpoint and acquires a rate-limit token on the chosen
    /// provider.
    ///
    /// On acquire timeout the next-best provider is tried once; when that
    /// also fails, the hard-coded public fallback is returned with
    /// `acquired = false`. A custom endpoint bypasses rate limiting.
    pub async fn resolve_endpoint_with_rate_limit(
        &self,
        timeout: Option<Duration>,
    ) -> ResolvedEndpoint {
        let timeout = timeout.unwrap_or(self.options.acquire_timeout);

        if let Some(custom) = self.selector.custom_endpoint() {
            *self.active.lock() = Some(ActiveProviderInfo {
                id: "custom".to_string(),
                network: self.options.network,
                endpoint: custom.clone(),
                is_custom: true,
            });
            return ResolvedEndpoint { url: custom, provider_id: None, acquired: true };
        }

        let network = self.options.network;
        let first_choice = self.selector.get_best_provider(network);

        let mut attempt = first_choice;
        for _ in 0..2 {
            let Some(provider) = attempt else { break };
            let limiter = self.limiters.get_or_create(&provider.id, provider.rps);
            if limiter.acquire(timeout).await {
                let url = self.endpoint_for(&provider).await;
                return ResolvedEndpoint {
                    url,
                    provider_id: Some(provider.id.clone()),
                    acquired: true,
                };
            }

            warn!(provider = %provider.id, "token acquisition timed out; trying next-best");
            attempt = self.selector.handle_provider_failure(&provider.id, network);
        }

        *self.active.lock() = None;
        ResolvedEndpoint {
            url: network.public_fallback_url().to_string(),
            provider_id: None,
            acquired: false,
        }
    }

    /// Builds the concrete URL for `provider` (running Orbs discovery for
    /// dynamic providers) and records it as the active provider.
    async fn endpoint_for(&self, provider: &ResolvedProvider) -> String {
        let static_url = provider
            .primary_endpoint()
            .unwrap_or_else(|| self.options.network.public_fallback_url());

        let endpoint = if provider.is_dynamic {
            self.discovery
                .discover_or_fallback(provider.network, static_url)
                .await
        } else {
            static_url.to_string()
        };

        let url = normalize_endpoint(provider.provider_type, &endpoint, provider.has_api_key());

        *self.active.lock() = Some(ActiveProviderInfo {
            id: provider.id.clone(),
            network: provider.network,
            endpoint: url.clone(),
            is_custom: false,
        });
        url
    }

    /// Reports a successful request against the active provider.
    pub fn report_success(&self) {
        let active = self.active.lock().clone();
        let Some(active) = active else { return };
        if active.is_custom {
            return;
        }
        if let Some(limiter) = self.limiters.get(&active.id) {
            limiter.report_success();
        }
    }

    /// Reports a failed request against the active provider.
    ///
    /// The message is classified (status-text substrings), the rate limiter
    /// and health checker are informed accordingly, and the selector is
    /// told to fail over on the next resolve.
    pub fn report_error(&self, error: &str) {
        let active = self.active.lock().clone();
        let Some(active) = active else { return };
        if active.is_custom {
            return;
        }

        let rps = self.registry.get(&active.id).map_or(1, |p| p.rps);
        let limiter = self.limiters.get_or_create(&active.id, rps);
        let class = ErrorClass::classify_message(error);

        match class {
            ErrorClass::RateLimited => {
                limiter.report_rate_limit_error();
                self.health.mark_degraded(&active.id, active.network, error);
            }
            ErrorClass::TransientServer | ErrorClass::PermanentEndpoint | ErrorClass::Timeout => {
                limiter.report_error();
                self.health.mark_offline(&active.id, active.network, error);
            }
            ErrorClass::BrowserIncompatible => {
                limiter.report_error();
                self.health.mark_degraded(&active.id, active.network, error);
                self.health.mark_browser_incompatible(&active.id, active.network);
            }
            ErrorClass::Malformed | ErrorClass::Other => {
                limiter.report_error();
                self.health.mark_degraded(&active.id, active.network, error);
            }
        }

        let _ = self.selector.handle_provider_failure(&active.id, active.network);
        self.emit_state();
    }

    /// Pins selection to `provider_id` (or clears the pin with `None`).
    pub fn set_selected_provider(&self, provider_id: Option<&str>) {
        self.selector.set_selected_provider(provider_id);
        self.emit_state();
    }

    /// Enables or disables automatic selection.
    pub fn set_auto_select(&self, auto_select: bool) {
        self.selector.set_auto_select(auto_select);
        self.emit_state();
    }

    /// Sets or clears the custom endpoint override.
    pub fn set_custom_endpoint(&self, endpoint: Option<&str>) {
        self.selector.set_custom_endpoint(endpoint);
        self.emit_state();
    }

    #[must_use]
    pub fn is_using_custom_endpoint(&self) -> bool {
        self.selector.is_using_custom_endpoint()
    }

    #[must_use]
    pub fn selected_provider_id(&self) -> Option<String> {
        self.selector.selected_provider_id()
    }

    /// The provider the last resolved endpoint belongs to.
    #[must_use]
    pub fn active_provider_info(&self) -> Option<ActiveProviderInfo> {
        self.active.lock().clone()
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.options.network
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    #[must_use]
    pub fn selector(&self) -> &Arc<ProviderSelector> {
        &self.selector
    }

    #[must_use]
    pub fn limiters(&self) -> &Arc<RateLimiterPool> {
        &self.limiters
    }

    /// Subscribes to state snapshots. The receiver always holds the latest
    /// snapshot; dropping it unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ManagerSnapshot> {
        self.state_tx.subscribe()
    }

    /// Current snapshot without subscribing.
    #[must_use]
    pub fn snapshot(&self) -> ManagerSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Stops background probing and releases the active provider. In-flight
    /// probes race to completion; their results are discarded by observers.
    pub fn destroy(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.probe_task.lock().take() {
            handle.abort();
        }
        *self.active.lock() = None;
        info!(network = %self.options.network, "provider manager destroyed");
    }

    fn emit_state(&self) {
        emit_snapshot(
            self.options.network,
            &self.registry,
            &self.health,
            &self.selector,
            &self.limiters,
            &self.state_tx,
        );
    }
}

/// Builds the current snapshot and pushes it to subscribers.
fn emit_snapshot(
    network: Network,
    registry: &ProviderRegistry,
    health: &HealthChecker,
    selector: &ProviderSelector,
    limiters: &RateLimiterPool,
    state_tx: &watch::Sender<ManagerSnapshot>,
) {
    let rate_limits = limiters.snapshot_all();

    let providers = registry
        .for_network(network)
        .into_iter()
        .map(|provider| {
            let view = ProviderStateView {
                health: health.get(&provider.id, network),
                rate_limit: rate_limits.get(&provider.id).cloned(),
            };
            (provider.id.clone(), view)
        })
        .collect();

    let snapshot = ManagerSnapshot {
        network,
        initialized: true,
        is_testing: health.is_sweeping(),
        providers,
        best_provider_id: selector.cached_best(network),
        selected_provider_id: selector.selected_provider_id(),
        auto_select: selector.auto_select(),
        custom_endpoint: selector.custom_endpoint(),
    };

    let _ = state_tx.send(snapshot);
}

impl Drop for ProviderManager {
    fn drop(&mut self) {
        if let Some(handle) = self.probe_task.lock().take() {
            handle.abort();
        }
    }
}

/// Process-wide managers, one per network, for embeddings where a single
/// instance serves the whole process. Multi-tenant contexts construct
/// instances directly.
fn global_managers() -> &'static DashMap<Network, Arc<ProviderManager>> {
    static GLOBAL: OnceLock<DashMap<Network, Arc<ProviderManager>>> = OnceLock::new();
    GLOBAL.get_or_init(DashMap::new)
}

impl ProviderManager {
    /// Initializes (or returns) the process-wide manager for `network`.
    /// Idempotent for the same network: later calls return the existing
    /// instance without touching its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Config`] when the first initialization
    /// rejects the configuration; the manager stays uninitialized.
    pub async fn init_global(
        config: &ProvidersConfig,
        env: &EnvSnapshot,
        options: ManagerOptions,
    ) -> Result<Arc<Self>, ManagerError> {
        let network = options.network;
        if let Some(existing) = global_managers().get(&network) {
            return Ok(Arc::clone(existing.value()));
        }

        let manager = Self::new(config, env, options)?;
        manager.start().await;
        global_managers().insert(network, Arc::clone(&manager));
        Ok(manager)
    }

    /// The process-wide manager for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotInitialized`] when `init_global` has not
    /// succeeded for this network.
    pub fn global(network: Network) -> Result<Arc<Self>, ManagerError> {
        global_managers()
            .get(&network)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ManagerError::NotInitialized(network))
    }
}
