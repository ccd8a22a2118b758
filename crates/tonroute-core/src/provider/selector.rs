//! Provider selection: scoring, overrides, and failover.
//!
//! Given the live registry and health state, the selector returns the best
//! provider for a network. Resolution order on every call:
//!
//! 1. A non-empty **custom endpoint** bypasses everything.
//! 2. With auto-select off, the **manual selection** wins when it exists
//!    and serves the target network.
//! 3. The **cached best** is reused while its health still qualifies.
//! 4. Otherwise candidates are **re-scored** and the maximum positive
//!    score wins; ties break by priority, then id.
//!
//! Failed providers inside their cooldown window are never returned - when
//! nothing is selectable the caller falls back to the hard-coded public
//! endpoint.

use super::{
    family::ProviderType,
    health::{HealthChecker, HealthResult, HealthStatus},
    registry::{ProviderRegistry, ResolvedProvider},
};
use crate::types::{ApiVersion, Network, RuntimeAdapter};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, warn};

/// Weights over the four sub-scores. Each sub-score lies in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub status: f64,
    pub latency: f64,
    pub priority: f64,
    pub freshness: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { status: 0.2, latency: 0.4, priority: 0.3, freshness: 0.3 }
    }
}

/// Selector tuning.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Time after a failure before a provider becomes a retry candidate.
    pub cooldown: Duration,
    /// Latency scoring anchor: this latency scores ~0.7, ten times it scores 0.
    pub preferred_latency_ms: u64,
    /// Statuses eligible for normal (non-fallback) selection.
    pub min_status: Vec<HealthStatus>,
    pub weights: ScoreWeights,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            preferred_latency_ms: 1000,
            min_status: vec![HealthStatus::Available, HealthStatus::Degraded],
            weights: ScoreWeights::default(),
        }
    }
}

/// Manual override state plus the advisory best-per-network cache.
#[derive(Default)]
struct OverrideState {
    auto_select: bool,
    selected_provider_id: Option<String>,
    custom_endpoint: Option<String>,
    best: HashMap<Network, String>,
}

/// Scores and picks a provider per request.
pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthChecker>,
    adapter: RuntimeAdapter,
    config: SelectorConfig,
    state: Mutex<OverrideState>,
}

impl ProviderSelector {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthChecker>,
        adapter: RuntimeAdapter,
        config: SelectorConfig,
    ) -> Self {
        Self {
            registry,
            health,
            adapter,
            config,
            state: Mutex::new(OverrideState { auto_select: true, ..OverrideState::default() }),
        }
    }

    /// Sets or clears the custom endpoint. Whitespace-only input clears it.
    pub fn set_custom_endpoint(&self, endpoint: Option<&str>) {
        let trimmed = endpoint.map(str::trim).filter(|e| !e.is_empty()).map(ToString::to_string);
        self.state.lock().custom_endpoint = trimmed;
    }

    #[must_use]
    pub fn custom_endpoint(&self) -> Option<String> {
        self.state.lock().custom_endpoint.clone()
    }

    #[must_use]
    pub fn is_using_custom_endpoint(&self) -> bool {
        self.state.lock().custom_endpoint.is_some()
    }

    /// Pins selection to one provider; auto-select turns off while pinned.
    pub fn set_selected_provider(&self, provider_id: Option<&str>) {
        let mut state = self.state.lock();
        state.selected_provider_id = provider_id.map(ToString::to_string);
        if state.selected_provider_id.is_some() {
            state.auto_select = false;
        }
    }

    #[must_use]
    pub fn selected_provider_id(&self) -> Option<String> {
        self.state.lock().selected_provider_id.clone()
    }

    /// Enables or disables automatic selection. Enabling clears the pin.
    pub fn set_auto_select(&self, auto_select: bool) {
        let mut state = self.state.lock();
        state.auto_select = auto_select;
        if auto_select {
            state.selected_provider_id = None;
        }
    }

    #[must_use]
    pub fn auto_select(&self) -> bool {
        self.state.lock().auto_select
    }

    /// The cached best id for `network`, if any.
    #[must_use]
    pub fn cached_best(&self, network: Network) -> Option<String> {
        self.state.lock().best.get(&network).cloned()
    }

    /// Drops the cached best for `network`.
    pub fn invalidate(&self, network: Network) {
        self.state.lock().best.remove(&network);
    }

    /// Returns the best provider for `network`, or `None` when nothing is
    /// selectable (callers then use the hard-coded public fallback).
    #[must_use]
    pub fn get_best_provider(&self, network: Network) -> Option<Arc<ResolvedProvider>> {
        // 1. Custom endpoint bypasses registry and health entirely.
        if let Some(endpoint) = self.custom_endpoint() {
            return Some(Arc::new(synthesize_custom_provider(&endpoint, network)));
        }

        // 2. Manual selection while auto-select is off.
        {
            let state = self.state.lock();
            if !state.auto_select {
                if let Some(selected_id) = &state.selected_provider_id {
                    if let Some(provider) = self.registry.get(selected_id) {
                        if provider.network == network {
                            return Some(provider);
                        }
                    }
                    warn!(
                        provider = %selected_id,
                        network = %network,
                        "manual selection unavailable; falling back to auto selection"
                    );
                }
            }
        }

        // 3. Cached best, while it still qualifies.
        if let Some(cached_id) = self.cached_best(network) {
            if let Some(provider) = self.registry.get(&cached_id) {
                if let Some(health) = self.health.get(&cached_id, network) {
                    if health.success && self.config.min_status.contains(&health.status) {
                        return Some(provider);
                    }
                }
            }
            self.invalidate(network);
        }

        // 4. Recompute.
        if let Some(provider) = self.pick_scored(network, None) {
            self.state.lock().best.insert(network, provider.id.clone());
            return Some(provider);
        }

        self.pick_fallback(network, None)
    }

    /// Reacts to a failure report against `provider_id`: drops the cache
    /// entry naming it and returns the next-best provider with it excluded.
    #[must_use]
    pub fn handle_provider_failure(
        &self,
        provider_id: &str,
        network: Network,
    ) -> Option<Arc<ResolvedProvider>> {
        {
            let mut state = self.state.lock();
            if state.best.get(&network).is_some_and(|cached| cached == provider_id) {
                state.best.remove(&network);
            }
        }

        self.pick_scored(network, Some(provider_id))
            .or_else(|| self.pick_fallback(network, Some(provider_id)))
    }

    /// Candidate list for `network`: enabled providers, browser-filtered
    /// when the adapter is a browser, ordered by (priority, id).
    fn candidates(&self, network: Network, exclude: Option<&str>) -> Vec<Arc<ResolvedProvider>> {
        self.registry
            .for_network(network)
            .into_iter()
            .filter(|provider| exclude != Some(provider.id.as_str()))
            .filter(|provider| self.passes_browser_filter(provider))
            .collect()
    }

    fn passes_browser_filter(&self, provider: &ResolvedProvider) -> bool {
        if self.adapter != RuntimeAdapter::Browser {
            return true;
        }
        if !provider.browser_compatible {
            return false;
        }
        self.health
            .get(&provider.id, provider.network)
            .map_or(true, |record| record.browser_compatible)
    }

    fn pick_scored(&self, network: Network, exclude: Option<&str>) -> Option<Arc<ResolvedProvider>> {
        let mut best: Option<(f64, Arc<ResolvedProvider>)> = None;

        for provider in self.candidates(network, exclude) {
            let health = self.health.get(&provider.id, network);
            let score = self.score(&provider, health.as_ref());
            debug!(provider = %provider.id, score = score, "scored candidate");

            if score <= 0.0 {
                continue;
            }
            // Candidates arrive (priority, id)-ordered, so strictly-greater
            // keeps the earlier candidate on ties.
            if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                best = Some((score, provider));
            }
        }

        best.map(|(_, provider)| provider)
    }

    /// Last-resort ladder when no candidate scores positive: the declared
    /// default order first, then any untested or cooled-down candidate.
    fn pick_fallback(&self, network: Network, exclude: Option<&str>) -> Option<Arc<ResolvedProvider>> {
        let usable = |provider: &Arc<ResolvedProvider>| -> bool {
            match self.health.get(&provider.id, network) {
                None => true,
                Some(health) => {
                    health.status == HealthStatus::Untested
                        || health.success
                        || self.cooldown_expired(&health)
                }
            }
        };

        for default_id in self.registry.default_order(network) {
            if exclude == Some(default_id.as_str()) {
                continue;
            }
            let Some(provider) = self.registry.get(&default_id) else {
                continue;
            };
            if !provider.enabled
                || provider.network != network
                || !self.passes_browser_filter(&provider)
            {
                continue;
            }
            if usable(&provider) {
                debug!(provider = %provider.id, "selected from default order");
                return Some(provider);
            }
        }

        self.candidates(network, exclude).into_iter().find(|provider| {
            match self.health.get(&provider.id, network) {
                None => true,
                Some(health) => {
                    health.status == HealthStatus::Untested || self.cooldown_expired(&health)
                }
            }
        })
    }

    fn cooldown_expired(&self, health: &HealthResult) -> bool {
        health
            .last_tested
            .map_or(true, |tested| tested.elapsed() > self.config.cooldown)
    }

    /// Per-(provider, network) score.
    fn score(&self, provider: &ResolvedProvider, health: Option<&HealthResult>) -> f64 {
        let priority_baseline = f64::from(provider.priority) + 1.0;

        let Some(health) = health else {
            return 0.01 / priority_baseline;
        };
        if health.status == HealthStatus::Untested {
            return 0.01 / priority_baseline;
        }
        if !health.success {
            // Strictly dominated retry candidate once the cooldown expires;
            // unselectable before that.
            return if self.cooldown_expired(health) { 0.001 / priority_baseline } else { 0.0 };
        }
        if health.status == HealthStatus::Offline
            || !self.config.min_status.contains(&health.status)
        {
            return 0.0;
        }

        let status_score = match health.status {
            HealthStatus::Available => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Stale => 0.3,
            _ => 0.0,
        };

        let latency_score = match health.latency_ms {
            None => 0.5,
            #[allow(clippy::cast_precision_loss)]
            Some(latency) => {
                let normalized = latency as f64 / self.config.preferred_latency_ms.max(1) as f64;
                (1.0 - (normalized + 1.0).ln() / 11.0_f64.ln()).max(0.0)
            }
        };

        let priority_score = (1.0 - f64::from(provider.priority) / 100.0).max(0.0);

        #[allow(clippy::cast_precision_loss)]
        let freshness_score = (1.0 - health.blocks_behind as f64 / 10.0).max(0.0);

        let weights = &self.config.weights;
        weights.status * status_score
            + weights.latency * latency_score
            + weights.priority * priority_score
            + weights.freshness * freshness_score
    }
}

/// The pseudo-provider handed out while a custom endpoint is set.
fn synthesize_custom_provider(endpoint: &str, network: Network) -> ResolvedProvider {
    ResolvedProvider {
        id: "custom".to_string(),
        display_name: "Custom endpoint".to_string(),
        provider_type: ProviderType::Custom,
        network,
        endpoints: BTreeMap::from([(ApiVersion::V2, endpoint.to_string())]),
        api_key: None,
        rps: 10,
        priority: 0,
        enabled: true,
        is_dynamic: false,
        browser_compatible: true,
    }
}
