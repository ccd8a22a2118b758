//! Error taxonomy and classification for provider failures.
//!
//! Transport libraries disagree on error types, so callers report failures
//! as opaque messages. [`ErrorClass::classify`] is the single classifier:
//! it prefers a structured HTTP status code when the transport exposes one
//! and falls back to message-substring matching.

use crate::types::MasterchainParseError;
use thiserror::Error;

/// Message fragments that identify a CORS rejection in browser runtimes.
///
/// Bare network errors are NOT classified as CORS.
const CORS_MARKERS: [&str; 5] = [
    "blocked by cors policy",
    "not allowed by access-control-allow-headers",
    "access-control",
    "x-ton-client-version",
    "cors",
];

/// Conceptual failure kinds surfaced by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// 429 or rate-limit text. Backoff applies; health degrades.
    RateLimited,
    /// 404/401/403. Not retried until operator intervention.
    PermanentEndpoint,
    /// 502/503 or backend-error text. Eligible for retry after cooldown.
    TransientServer,
    /// Deadline elapsed or the request was aborted.
    Timeout,
    /// Invalid JSON, bad seqno, or an unknown envelope.
    Malformed,
    /// CORS rejection observed; the provider is excluded in browser mode.
    BrowserIncompatible,
    /// Anything unrecognized. Treated as non-429, non-fatal.
    Other,
}

impl ErrorClass {
    /// Classifies a failure from an optional HTTP status and its message.
    ///
    /// The status code wins when present; substring matching on the
    /// lowercased message is the fallback.
    #[must_use]
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        if let Some(status) = status {
            match status {
                429 => return ErrorClass::RateLimited,
                401 | 403 | 404 => return ErrorClass::PermanentEndpoint,
                500..=599 => return ErrorClass::TransientServer,
                _ => {}
            }
        }
        Self::classify_message(message)
    }

    /// Substring-only classification, for errors with no transport status.
    #[must_use]
    pub fn classify_message(message: &str) -> Self {
        let message = message.to_lowercase();

        if CORS_MARKERS.iter().any(|marker| message.contains(marker)) {
            return ErrorClass::BrowserIncompatible;
        }
        if message.contains("429")
            || message.contains("rate limit")
            || message.contains("too many requests")
        {
            return ErrorClass::RateLimited;
        }
        if message.contains("503")
            || message.contains("service unavailable")
            || message.contains("502")
            || message.contains("bad gateway")
            || message.contains("backend error")
        {
            return ErrorClass::TransientServer;
        }
        if message.contains("404")
            || message.contains("not found")
            || message.contains("401")
            || message.contains("unauthorized")
            || message.contains("403")
            || message.contains("forbidden")
        {
            return ErrorClass::PermanentEndpoint;
        }
        if message.contains("timeout") || message.contains("timed out") || message.contains("abort")
        {
            return ErrorClass::Timeout;
        }
        ErrorClass::Other
    }

    /// Whether the failure may clear on its own after a cooldown.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorClass::RateLimited | ErrorClass::TransientServer | ErrorClass::Timeout
        )
    }

    /// Whether operator action (keys, config) is needed before retrying.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, ErrorClass::PermanentEndpoint)
    }

    /// Static label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::PermanentEndpoint => "permanent_endpoint",
            ErrorClass::TransientServer => "transient_server",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Malformed => "malformed",
            ErrorClass::BrowserIncompatible => "browser_incompatible",
            ErrorClass::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while probing or resolving a provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Request exceeded the configured timeout; the in-flight call was aborted.
    #[error("request timeout")]
    Timeout,

    /// Failed to reach the endpoint at all.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP response. Fields are the status code and (truncated) body.
    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),

    /// Response body could not be decoded into masterchain info.
    #[error("malformed response: {0}")]
    Malformed(#[from] MasterchainParseError),

    /// A family that requires a header credential has none configured.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// No rate-limit token could be acquired before the deadline.
    #[error("rate limit timeout")]
    RateLimitTimeout,

    /// Endpoint template still carries an unresolved `{key}` placeholder.
    #[error("unresolved key placeholder in endpoint: {0}")]
    UnresolvedKey(String),
}

impl ProviderError {
    /// Maps this error onto the conceptual taxonomy.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Timeout => ErrorClass::Timeout,
            ProviderError::HttpError(status, body) => ErrorClass::classify(Some(*status), body),
            ProviderError::Malformed(_) => ErrorClass::Malformed,
            ProviderError::MissingCredentials(_) | ProviderError::UnresolvedKey(_) => {
                ErrorClass::PermanentEndpoint
            }
            // A local token-acquire timeout is a deadline failure, not a
            // throttle signal from the provider; it must not raise backoff.
            ProviderError::RateLimitTimeout => ErrorClass::Timeout,
            ProviderError::ConnectionFailed(message) => ErrorClass::classify_message(message),
        }
    }
}
