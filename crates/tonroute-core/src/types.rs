//! Core type definitions: networks, API versions, and the probe wire format.
//!
//! # Type Categories
//!
//! ## Protocol Types
//! - [`JsonRpcRequest`]: the JSON-RPC 2.0 envelope used for health probes
//! - [`MasterchainInfo`]: the decoded chain-tip descriptor
//! - [`ResponseEnvelope`]: the tolerant decoder over the three response
//!   shapes TON providers actually return
//!
//! ## Identity Types
//! - [`Network`]: the logical chain a manager instance serves
//! - [`ApiVersion`]: which provider API surface an endpoint template targets
//! - [`RuntimeAdapter`]: whether selection must honor browser (CORS) limits

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// The health-probe method. Every supported provider family answers it with
/// a monotonically increasing masterchain block sequence number.
pub const MASTERCHAIN_INFO_METHOD: &str = "getMasterchainInfo";

/// Logical TON network served by a manager instance.
///
/// Immutable per manager instance after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    /// Returns the lowercase name used in config keys and discovery calls.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Hard-coded public endpoint used when no provider is selectable.
    #[must_use]
    pub fn public_fallback_url(&self) -> &'static str {
        match self {
            Network::Testnet => "https://testnet.toncenter.com/api/v2/jsonRPC",
            Network::Mainnet => "https://toncenter.com/api/v2/jsonRPC",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// API surface tag for a provider endpoint template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V2,
    V3,
    V4,
    Ws,
}

impl ApiVersion {
    /// The HTTP-probeable versions, in preference order. `ws` endpoints are
    /// carried through resolution but never probed.
    pub const HTTP: [ApiVersion; 3] = [ApiVersion::V2, ApiVersion::V3, ApiVersion::V4];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
            ApiVersion::V4 => "v4",
            ApiVersion::Ws => "ws",
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which I/O environment the embedding application runs in.
///
/// In [`RuntimeAdapter::Browser`] mode the selector excludes providers whose
/// config or observed health marks them CORS-incompatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeAdapter {
    #[default]
    Server,
    Browser,
}

/// JSON-RPC 2.0 request structure used for health probes.
///
/// The `jsonrpc` field uses `Cow<'static, str>` so constructing a request
/// with the static version string allocates nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: String,
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with zero allocation for the version string.
    #[must_use]
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: "1".to_string(),
            jsonrpc: JSONRPC_VERSION_COW,
            method: method.into(),
            params,
        }
    }

    /// The `getMasterchainInfo` probe envelope:
    /// `{"id":"1","jsonrpc":"2.0","method":"getMasterchainInfo","params":{}}`.
    #[must_use]
    pub fn masterchain_info() -> Self {
        Self::new(MASTERCHAIN_INFO_METHOD, serde_json::json!({}))
    }
}

/// Decoded chain-tip descriptor from a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterchainInfo {
    /// Masterchain block sequence number. Always positive once validated.
    pub seqno: u64,
}

/// Errors produced while decoding a probe response body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MasterchainParseError {
    /// The body matched the `{ok: false, …}` or `{error}` shape.
    #[error("provider returned error: {0}")]
    ErrorBody(String),

    /// The body matched a known shape but carried no `last.seqno`.
    #[error("missing last.seqno in response")]
    MissingSeqno,

    /// `last.seqno` was present but not a positive integer.
    #[error("invalid seqno: {0}")]
    InvalidSeqno(String),

    /// None of the accepted envelope shapes matched.
    #[error("unrecognized response shape")]
    UnknownShape,
}

/// The response shapes providers answer `getMasterchainInfo` with.
///
/// Decoded by inspecting the body in a fixed order; implementations MUST
/// tolerate all three success shapes:
///
/// 1. `{ok, result, error}` wrapper (toncenter dialect)
/// 2. `{result: …}` plain JSON-RPC
/// 3. direct `{last: {seqno, …}, …}` body
/// 4. `{error}` — failure
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// Toncenter-style `{ok: true, result}` wrapper; payload is the result value.
    OkWrapper(serde_json::Value),
    /// Plain JSON-RPC `{result}`; payload is the result value.
    JsonRpc(serde_json::Value),
    /// The body itself is the masterchain info.
    Direct(serde_json::Value),
    /// An error body (`{ok: false}` or `{error}`); payload is the message.
    Error(String),
    /// Nothing matched.
    Unknown,
}

impl ResponseEnvelope {
    /// Classifies a response body into one of the accepted shapes.
    #[must_use]
    pub fn classify(body: &serde_json::Value) -> Self {
        let Some(obj) = body.as_object() else {
            return ResponseEnvelope::Unknown;
        };

        if let Some(ok) = obj.get("ok").and_then(serde_json::Value::as_bool) {
            if ok {
                return match obj.get("result") {
                    Some(result) => ResponseEnvelope::OkWrapper(result.clone()),
                    None => ResponseEnvelope::Unknown,
                };
            }
            let message = obj
                .get("error")
                .map_or_else(|| "ok=false".to_string(), describe_error_value);
            return ResponseEnvelope::Error(message);
        }

        if let Some(result) = obj.get("result") {
            return ResponseEnvelope::JsonRpc(result.clone());
        }

        if obj.contains_key("last") {
            return ResponseEnvelope::Direct(body.clone());
        }

        if let Some(error) = obj.get("error") {
            return ResponseEnvelope::Error(describe_error_value(error));
        }

        ResponseEnvelope::Unknown
    }
}

fn describe_error_value(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| other.to_string(), ToString::to_string),
    }
}

/// Decodes a probe response body into [`MasterchainInfo`].
///
/// Tries each accepted envelope shape in the fixed order documented on
/// [`ResponseEnvelope`], then validates that `last.seqno` is a positive
/// integer.
///
/// # Errors
///
/// Returns [`MasterchainParseError`] when the body is an error envelope,
/// an unknown shape, or carries a non-positive seqno.
pub fn parse_masterchain_info(
    body: &serde_json::Value,
) -> Result<MasterchainInfo, MasterchainParseError> {
    let payload = match ResponseEnvelope::classify(body) {
        ResponseEnvelope::OkWrapper(result) | ResponseEnvelope::JsonRpc(result) => result,
        ResponseEnvelope::Direct(body) => body,
        ResponseEnvelope::Error(message) => {
            return Err(MasterchainParseError::ErrorBody(message));
        }
        ResponseEnvelope::Unknown => return Err(MasterchainParseError::UnknownShape),
    };

    let seqno_value = payload
        .get("last")
        .and_then(|last| last.get("seqno"))
        .ok_or(MasterchainParseError::MissingSeqno)?;

    let seqno = seqno_value
        .as_i64()
        .ok_or_else(|| MasterchainParseError::InvalidSeqno(seqno_value.to_string()))?;

    if seqno <= 0 {
        return Err(MasterchainParseError::InvalidSeqno(seqno.to_string()));
    }

    #[allow(clippy::cast_sign_loss)]
    let seqno = seqno as u64;
    Ok(MasterchainInfo { seqno })
}
