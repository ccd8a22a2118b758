//! Health checking: probing providers and classifying the outcome.
//!
//! The checker owns the [`HealthResult`] map (keyed by `provider|network`)
//! and feeds the per-network chain tip. Probes go through the provider's
//! rate limiter like any other request, so a probe sweep cannot trip a
//! provider's own limits.
//!
//! Records are written whole: readers observe either the pre- or post-probe
//! value, never a half-updated one. At most one probe per (provider,
//! network) is in flight at a time.

use super::{
    discovery::EndpointDiscovery,
    errors::{ErrorClass, ProviderError},
    family::ProviderType,
    http_client::HttpClient,
    normalize::normalize_endpoint,
    ratelimit::RateLimiterPool,
    registry::{ResolvedProvider, KEY_TOKEN},
};
use crate::{
    chain::ChainTips,
    types::{parse_masterchain_info, JsonRpcRequest, Network},
};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Health checker tuning.
#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    /// Per-probe deadline, covering token acquisition and the HTTP call.
    pub probe_timeout_ms: u64,
    /// Latency above which a successful probe is only `Degraded`.
    pub degraded_latency_ms: u64,
    /// Blocks behind the network tip above which a provider is `Stale`.
    pub max_blocks_behind: u64,
    /// Providers probed concurrently per batch.
    pub batch_size: usize,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 10_000,
            degraded_latency_ms: 2_000,
            max_blocks_behind: 10,
            batch_size: 2,
        }
    }
}

/// Provider health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Untested,
    Testing,
    Available,
    Degraded,
    Stale,
    Offline,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Untested => "untested",
            HealthStatus::Testing => "testing",
            HealthStatus::Available => "available",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Stale => "stale",
            HealthStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the last probe (or explicit mark) for one (provider, network).
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub status: HealthStatus,
    /// Whether the last probe succeeded end-to-end.
    pub success: bool,
    pub latency_ms: Option<u64>,
    /// Last observed chain tip seqno.
    pub seqno: Option<u64>,
    pub blocks_behind: u64,
    pub last_tested: Option<Instant>,
    pub error: Option<String>,
    /// Config flag AND-ed with "no CORS error observed".
    pub browser_compatible: bool,
}

impl HealthResult {
    fn untested(browser_compatible: bool) -> Self {
        Self {
            status: HealthStatus::Untested,
            success: false,
            latency_ms: None,
            seqno: None,
            blocks_behind: 0,
            last_tested: None,
            error: None,
            browser_compatible,
        }
    }
}

fn health_key(provider_id: &str, network: Network) -> String {
    format!("{provider_id}|{network}")
}

/// Probes providers and maintains their [`HealthResult`] records.
pub struct HealthChecker {
    http: Arc<HttpClient>,
    discovery: Arc<EndpointDiscovery>,
    limiters: Arc<RateLimiterPool>,
    tips: Arc<ChainTips>,
    config: HealthCheckerConfig,
    results: DashMap<String, HealthResult>,
    in_flight: DashSet<String>,
    sweeping: AtomicBool,
}

impl HealthChecker {
    #[must_use]
    pub fn new(
        http: Arc<HttpClient>,
        discovery: Arc<EndpointDiscovery>,
        limiters: Arc<RateLimiterPool>,
        tips: Arc<ChainTips>,
        config: HealthCheckerConfig,
    ) -> Self {
        Self {
            http,
            discovery,
            limiters,
            tips,
            config,
            results: DashMap::new(),
            in_flight: DashSet::new(),
            sweeping: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HealthCheckerConfig {
        &self.config
    }

    #[must_use]
    pub fn tips(&self) -> &Arc<ChainTips> {
        &self.tips
    }

    /// The current record for `(provider_id, network)`, if one exists.
    #[must_use]
    pub fn get(&self, provider_id: &str, network: Network) -> Option<HealthResult> {
        self.results.get(&health_key(provider_id, network)).map(|entry| entry.clone())
    }

    /// All records, keyed by `provider|network`.
    #[must_use]
    pub fn all(&self) -> HashMap<String, HealthResult> {
        self.results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Whether a batch sweep is currently running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Relaxed)
    }

    /// Probes one provider and records the outcome.
    ///
    /// If a probe for the same (provider, network) is already in flight,
    /// the duplicate request is dropped and the current record returned.
    pub async fn probe(&self, provider: &ResolvedProvider) -> HealthResult {
        let key = health_key(&provider.id, provider.network);

        if !self.in_flight.insert(key.clone()) {
            debug!(provider = %provider.id, "probe already in flight; returning current record");
            return self
                .get(&provider.id, provider.network)
                .unwrap_or_else(|| HealthResult::untested(provider.browser_compatible));
        }

        let previous = self.get(&provider.id, provider.network);
        self.results.insert(
            key.clone(),
            HealthResult {
                status: HealthStatus::Testing,
                success: false,
                last_tested: Some(Instant::now()),
                error: None,
                ..previous.unwrap_or_else(|| HealthResult::untested(provider.browser_compatible))
            },
        );

        let result = self.probe_inner(provider).await;

        self.results.insert(key.clone(), result.clone());
        self.in_flight.remove(&key);

        if result.success {
            info!(
                provider = %provider.id,
                network = %provider.network,
                status = %result.status,
                latency_ms = result.latency_ms,
                seqno = result.seqno,
                blocks_behind = result.blocks_behind,
                "probe passed"
            );
        } else {
            warn!(
                provider = %provider.id,
                network = %provider.network,
                status = %result.status,
                error = result.error.as_deref().unwrap_or("unknown"),
                "probe failed"
            );
        }

        result
    }

    /// Probes providers in small batches.
    ///
    /// Batches run `batch_size` probes concurrently with an inter-batch
    /// delay derived from the smallest declared RPS in the batch (500 ms
    /// floor). Probing everything at once trips the smaller providers'
    /// limits.
    pub async fn probe_all(&self, providers: &[Arc<ResolvedProvider>]) {
        self.sweeping.store(true, Ordering::Relaxed);

        let batches: Vec<_> = providers.chunks(self.config.batch_size.max(1)).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            join_all(batch.iter().map(|provider| self.probe(provider))).await;

            if index + 1 < batch_count {
                let min_rps = batch.iter().map(|p| p.rps.max(1)).min().unwrap_or(1);
                let delay_ms = (1000 / u64::from(min_rps)).max(500);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        self.sweeping.store(false, Ordering::Relaxed);
    }

    /// Unconditionally marks a provider `Degraded` (`success = false`),
    /// preserving prior seqno and latency for diagnostics.
    pub fn mark_degraded(&self, provider_id: &str, network: Network, cause: &str) {
        self.mark(provider_id, network, HealthStatus::Degraded, cause);
    }

    /// Unconditionally marks a provider `Offline` (`success = false`),
    /// preserving prior seqno and latency for diagnostics.
    pub fn mark_offline(&self, provider_id: &str, network: Network, cause: &str) {
        self.mark(provider_id, network, HealthStatus::Offline, cause);
    }

    /// Flips the browser-compatibility flag off after an observed CORS
    /// rejection.
    pub fn mark_browser_incompatible(&self, provider_id: &str, network: Network) {
        let key = health_key(provider_id, network);
        let mut record = self
            .results
            .get(&key)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| HealthResult::untested(true));
        record.browser_compatible = false;
        self.results.insert(key, record);
    }

    /// Replaces the record for `(provider_id, network)` wholesale.
    #[doc(hidden)]
    pub fn insert_record(&self, provider_id: &str, network: Network, record: HealthResult) {
        self.results.insert(health_key(provider_id, network), record);
    }

    fn mark(&self, provider_id: &str, network: Network, status: HealthStatus, cause: &str) {
        let key = health_key(provider_id, network);
        let previous = self
            .results
            .get(&key)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| HealthResult::untested(true));

        self.results.insert(
            key,
            HealthResult {
                status,
                success: false,
                last_tested: Some(Instant::now()),
                error: Some(cause.to_string()),
                ..previous
            },
        );

        warn!(provider = %provider_id, network = %network, status = %status, cause = %cause, "provider marked");
    }

    async fn probe_inner(&self, provider: &ResolvedProvider) -> HealthResult {
        let network = provider.network;
        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);

        // Required credentials and unresolved templates fail before any I/O.
        if let Err(error) = provider.validate() {
            return self.failure(provider, None, &error);
        }

        let limiter = self.limiters.get_or_create(&provider.id, provider.rps);
        if !limiter.acquire(probe_timeout).await {
            return self.failure(provider, None, &ProviderError::RateLimitTimeout);
        }

        let Some(static_url) = provider.primary_endpoint() else {
            return self.failure(
                provider,
                None,
                &ProviderError::MissingCredentials("no HTTP endpoint configured".to_string()),
            );
        };

        let endpoint = if provider.is_dynamic {
            self.discovery.discover_or_fallback(network, static_url).await
        } else {
            static_url.to_string()
        };

        if endpoint.contains(KEY_TOKEN) {
            return self.failure(provider, None, &ProviderError::UnresolvedKey(provider.id.clone()));
        }

        let url = normalize_endpoint(provider.provider_type, &endpoint, provider.has_api_key());
        let headers = provider.provider_type.auth_headers(provider.api_key.as_deref());
        let request = JsonRpcRequest::masterchain_info();

        let started = Instant::now();
        let outcome = self
            .http
            .post_json(&url, &headers, &request, probe_timeout)
            .await
            .and_then(|body| parse_masterchain_info(&body).map_err(ProviderError::from));
        #[allow(clippy::cast_possible_truncation)]
        let mut latency_ms = started.elapsed().as_millis() as u64;

        let outcome = match outcome {
            Err(error)
                if provider.provider_type == ProviderType::Onfinality
                    && url.ends_with("/rpc")
                    && error.to_string().to_lowercase().contains("backend error") =>
            {
                // Keyed OnFinality deployments sometimes wedge on /rpc while
                // /public still serves; one keyless retry decides.
                let public_url = format!("{}/public", url.trim_end_matches("/rpc"));
                debug!(provider = %provider.id, url = %public_url, "retrying against public endpoint");

                let retry_started = Instant::now();
                let retried = self
                    .http
                    .post_json(&public_url, &[], &request, probe_timeout)
                    .await
                    .and_then(|body| parse_masterchain_info(&body).map_err(ProviderError::from));
                #[allow(clippy::cast_possible_truncation)]
                {
                    latency_ms = retry_started.elapsed().as_millis() as u64;
                }
                retried.map_err(|_| error)
            }
            other => other,
        };

        match outcome {
            Ok(info) => {
                limiter.report_success();
                self.tips.record(network, info.seqno);
                let blocks_behind = self.tips.blocks_behind(network, info.seqno);

                let status = if blocks_behind > self.config.max_blocks_behind {
                    HealthStatus::Stale
                } else if latency_ms > self.config.degraded_latency_ms {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Available
                };

                HealthResult {
                    status,
                    success: true,
                    latency_ms: Some(latency_ms),
                    seqno: Some(info.seqno),
                    blocks_behind,
                    last_tested: Some(Instant::now()),
                    error: None,
                    browser_compatible: self.current_browser_flag(provider),
                }
            }
            Err(error) => self.failure(provider, Some(latency_ms), &error),
        }
    }

    fn failure(
        &self,
        provider: &ResolvedProvider,
        latency_ms: Option<u64>,
        error: &ProviderError,
    ) -> HealthResult {
        let class = error.class();
        let previous = self.get(&provider.id, provider.network);

        let status = match class {
            ErrorClass::RateLimited => {
                self.limiters
                    .get_or_create(&provider.id, provider.rps)
                    .report_rate_limit_error();
                HealthStatus::Degraded
            }
            _ => HealthStatus::Offline,
        };

        let latency_ms = if class == ErrorClass::Timeout { None } else { latency_ms };

        let browser_compatible = if class == ErrorClass::BrowserIncompatible {
            false
        } else {
            self.current_browser_flag(provider)
        };

        HealthResult {
            status,
            success: false,
            latency_ms,
            seqno: previous.as_ref().and_then(|p| p.seqno),
            blocks_behind: previous.as_ref().map_or(0, |p| p.blocks_behind),
            last_tested: Some(Instant::now()),
            error: Some(error.to_string()),
            browser_compatible,
        }
    }

    /// The effective browser flag: the config value AND-ed with whatever a
    /// previous probe observed.
    fn current_browser_flag(&self, provider: &ResolvedProvider) -> bool {
        let observed = self
            .get(&provider.id, provider.network)
            .map_or(true, |record| record.browser_compatible);
        provider.browser_compatible && observed
    }
}
