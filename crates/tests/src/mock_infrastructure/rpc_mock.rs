//! RPC mock builder for TON JSON-RPC testing.
//!
//! Wraps mockito to provide TON-specific response builders for the
//! `getMasterchainInfo` probe, covering every envelope dialect the
//! providers answer with.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

/// Body matcher for the masterchain-info probe.
fn masterchain_info_matcher() -> Matcher {
    Matcher::Regex(r#""method"\s*:\s*"getMasterchainInfo""#.to_string())
}

/// Builder for mock TON RPC providers.
///
/// Uses mockito internally but provides TON-specific helpers. Probes land
/// on `/jsonRPC` for generic providers (the normalizer appends it to a
/// bare host), so that is the default mocked path.
pub struct TonRpcMock {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl TonRpcMock {
    /// Creates a new mock builder with a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    /// Returns the base URL of the mock server (no trailing path).
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Mocks a successful probe in the toncenter `{ok, result}` wrapper.
    pub async fn mock_ok_wrapper(&mut self, seqno: u64) -> &mut Self {
        let body = json!({
            "ok": true,
            "result": {
                "@type": "blocks.masterchainInfo",
                "last": { "workchain": -1, "seqno": seqno }
            }
        });
        self.mock_body("/jsonRPC", 200, &body.to_string()).await
    }

    /// Mocks a successful probe as a plain JSON-RPC `{result}` response.
    pub async fn mock_jsonrpc_result(&mut self, seqno: u64) -> &mut Self {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": { "last": { "seqno": seqno } }
        });
        self.mock_body("/jsonRPC", 200, &body.to_string()).await
    }

    /// Mocks a successful probe as a direct `{last, init}` body.
    pub async fn mock_direct(&mut self, seqno: u64) -> &mut Self {
        let body = json!({
            "last": { "seqno": seqno },
            "init": { "seqno": 1 }
        });
        self.mock_body("/jsonRPC", 200, &body.to_string()).await
    }

    /// Mocks a successful direct-shape probe on an explicit path (e.g.
    /// `/public` for the OnFinality fallback).
    pub async fn mock_direct_on(&mut self, path: &str, seqno: u64) -> &mut Self {
        let body = json!({ "last": { "seqno": seqno } });
        self.mock_body(path, 200, &body.to_string()).await
    }

    /// Mocks a fixed HTTP status with an arbitrary body on `/jsonRPC`.
    pub async fn mock_status(&mut self, status: u16, body: &str) -> &mut Self {
        let owned = body.to_string();
        let mock = self
            .server
            .mock("POST", "/jsonRPC")
            .match_body(masterchain_info_matcher())
            .with_status(usize::from(status))
            .with_header("content-type", "application/json")
            .with_body(owned)
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Mocks a fixed HTTP status on an explicit path.
    pub async fn mock_status_on(&mut self, path: &str, status: u16, body: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", path)
            .with_status(usize::from(status))
            .with_body(body.to_string())
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Mocks a probe whose response arrives after `delay_ms`.
    pub async fn mock_slow_direct(&mut self, seqno: u64, delay_ms: u64) -> &mut Self {
        let body = json!({ "last": { "seqno": seqno } }).to_string();
        let mock = self
            .server
            .mock("POST", "/jsonRPC")
            .match_body(masterchain_info_matcher())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                body.clone().into_bytes()
            })
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Mocks a discovery-service response (`GET` with a `network` query)
    /// pointing at `gateway_url`.
    pub async fn mock_discovery(&mut self, gateway_url: &str) -> &mut Self {
        let body = json!([{ "url": gateway_url, "healthy": true }]);
        let mock = self
            .server
            .mock("GET", Matcher::Regex("^/nodes".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    async fn mock_body(&mut self, path: &str, status: u16, body: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", path)
            .match_body(masterchain_info_matcher())
            .with_status(usize::from(status))
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.mocks.push(mock);
        self
    }

    /// Asserts that every registered mock was hit at least once.
    pub async fn assert_all(&self) {
        for mock in &self.mocks {
            mock.assert_async().await;
        }
    }
}
