//! Runtime endpoint discovery for dynamic providers.
//!
//! Orbs-family providers do not serve traffic at a fixed URL: the real
//! gateway is obtained from their endpoint-discovery service on each
//! resolution. Discovery failure is never fatal - callers fall back to the
//! configured static URL.

use super::{errors::ProviderError, http_client::HttpClient};
use crate::types::Network;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Default Orbs endpoint-discovery service.
const DEFAULT_DISCOVERY_URL: &str = "https://ton.access.orbs.network/mngr/nodes";

/// Client for the external endpoint-discovery service.
pub struct EndpointDiscovery {
    http: Arc<HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl EndpointDiscovery {
    #[must_use]
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_base_url(http, DEFAULT_DISCOVERY_URL)
    }

    /// Overrides the discovery service URL (tests point this at a mock).
    #[must_use]
    pub fn with_base_url(http: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), timeout: Duration::from_secs(5) }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Asks the discovery service for the gateway URL serving `network`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the service is unreachable or its
    /// response carries no usable URL.
    pub async fn discover(&self, network: Network) -> Result<String, ProviderError> {
        let url = format!("{}?network={}", self.base_url, network);
        let body = self.http.get_json(&url, self.timeout).await?;

        extract_gateway_url(&body).ok_or_else(|| {
            ProviderError::ConnectionFailed("discovery response carried no endpoint".to_string())
        })
    }

    /// Discovery with static fallback: returns the discovered URL, or
    /// `fallback` when the service fails.
    pub async fn discover_or_fallback(&self, network: Network, fallback: &str) -> String {
        match self.discover(network).await {
            Ok(url) => {
                debug!(network = %network, url = %url, "endpoint discovery succeeded");
                url
            }
            Err(error) => {
                warn!(
                    network = %network,
                    error = %error,
                    "endpoint discovery failed; using configured static endpoint"
                );
                fallback.to_string()
            }
        }
    }
}

/// Pulls a gateway URL out of a discovery response.
///
/// Accepted shapes: a bare string, an object with `url`/`endpoint`, or an
/// array of either (first healthy entry wins; entries with
/// `"healthy": false` are skipped).
fn extract_gateway_url(body: &serde_json::Value) -> Option<String> {
    match body {
        serde_json::Value::String(url) => Some(url.clone()),
        serde_json::Value::Object(object) => {
            if object.get("healthy").and_then(serde_json::Value::as_bool) == Some(false) {
                return None;
            }
            object
                .get("url")
                .or_else(|| object.get("endpoint"))
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        }
        serde_json::Value::Array(entries) => entries.iter().find_map(extract_gateway_url),
        _ => None,
    }
}
