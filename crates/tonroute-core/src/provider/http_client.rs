//! HTTP client used for health probes and endpoint discovery.
//!
//! Thin wrapper over `reqwest` with connection pooling, a per-request
//! timeout that aborts the in-flight call, semaphore-based concurrency
//! control, and sanitized network error text. There is deliberately no
//! retry loop here: failover decisions belong to the caller.

use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use super::errors::ProviderError;
use crate::types::JsonRpcRequest;

/// Longest response-body excerpt carried inside an error.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Configuration for HTTP client behavior.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum number of concurrent HTTP requests allowed.
    pub concurrent_limit: usize,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { concurrent_limit: 64, connect_timeout_secs: 5 }
    }
}

/// Pooled HTTP client shared by the health checker and discovery.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
}

impl HttpClient {
    /// Creates a new HTTP client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, ProviderError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("tonroute/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                ProviderError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client, concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)) })
    }

    /// POSTs a JSON-RPC envelope and returns the decoded response body.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Timeout`] if the request deadline elapses (the
    ///   connection is aborted, not leaked)
    /// - [`ProviderError::HttpError`] for non-2xx responses, carrying the
    ///   status and a truncated body excerpt
    /// - [`ProviderError::ConnectionFailed`] for network-level failures,
    ///   with sanitized text
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProviderError> {
        let _permit = Arc::clone(&self.concurrent_limit)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::ConnectionFailed("client shut down".to_string()))?;

        let mut builder = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(request)
            .timeout(timeout);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(ProviderError::HttpError(status.as_u16(), truncate_body(&body)));
        }

        serde_json::from_str(&body).map_err(|_| {
            // Surface the body text: "backend error" pages arrive as non-JSON 200s
            ProviderError::HttpError(status.as_u16(), truncate_body(&body))
        })
    }

    /// GETs a URL and returns the decoded JSON body (used by discovery).
    ///
    /// # Errors
    ///
    /// Same surface as [`Self::post_json`].
    pub async fn get_json(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProviderError> {
        let _permit = Arc::clone(&self.concurrent_limit)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::ConnectionFailed("client shut down".to_string()))?;

        let response = self.client.get(url).timeout(timeout).send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::HttpError(status.as_u16(), truncate_body(&body)));
        }

        response.json().await.map_err(map_send_error)
    }
}

fn map_send_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        return ProviderError::Timeout;
    }
    ProviderError::ConnectionFailed(sanitize_network_error(&error))
}

/// Sanitizes network errors to avoid leaking connection internals.
fn sanitize_network_error(error: &reqwest::Error) -> String {
    if error.is_connect() {
        "connection refused or unreachable".to_string()
    } else if error.is_request() {
        "request failed".to_string()
    } else if error.is_body() || error.is_decode() {
        "response body error".to_string()
    } else if error.is_redirect() {
        "too many redirects".to_string()
    } else {
        "network error".to_string()
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LEN {
        let cut = body
            .char_indices()
            .take_while(|(index, _)| *index <= MAX_ERROR_BODY_LEN)
            .last()
            .map_or(0, |(index, _)| index);
        format!("{}... (truncated)", &body[..cut])
    } else {
        body.to_string()
    }
}
