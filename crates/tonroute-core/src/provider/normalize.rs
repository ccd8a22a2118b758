//! Endpoint normalization: the exact URL a JSON-RPC request is POSTed to.
//!
//! This is the ONLY place that knows per-family URL rules. The function is
//! pure string manipulation: total (never panics on any input, URL or not)
//! and idempotent (`normalize(normalize(x)) == normalize(x)`).
//!
//! Orbs dynamic discovery is a separate asynchronous step (see
//! [`super::discovery`]) invoked by higher layers before normalization; the
//! discovered URL is what gets normalized here.

use super::family::ProviderType;

/// Canonical JSON-RPC path suffix.
const JSONRPC_SUFFIX: &str = "/jsonRPC";

/// Normalizes a provider endpoint URL per its family's rules.
///
/// `has_key` matters only for OnFinality, which routes keyed traffic to
/// `/rpc` and anonymous traffic to `/public`.
#[must_use]
pub fn normalize_endpoint(family: ProviderType, url: &str, has_key: bool) -> String {
    let url = strip_trailing_slash(url.trim());

    match family {
        ProviderType::Toncenter
        | ProviderType::Chainstack
        | ProviderType::Quicknode
        | ProviderType::Getblock
        | ProviderType::Tatum => append_jsonrpc(url),

        ProviderType::Onfinality => {
            let url = strip_trailing_slash(strip_query(url));
            if ends_with_segment(url, "/rpc") || ends_with_segment(url, "/public") {
                url.to_string()
            } else if has_key {
                format!("{url}/rpc")
            } else {
                format!("{url}/public")
            }
        }

        // A discovered Orbs gateway ending `/api/v2` is used as-is; anything
        // else gets the generic treatment.
        ProviderType::Orbs => {
            if url.ends_with("/api/v2") {
                url.to_string()
            } else {
                normalize_generic(url)
            }
        }

        ProviderType::Ankr | ProviderType::Tonhub | ProviderType::Custom => normalize_generic(url),
    }
}

/// Families whose endpoints always speak JSON-RPC at `/jsonRPC`.
fn append_jsonrpc(url: &str) -> String {
    if ends_with_jsonrpc(url) {
        return url.to_string();
    }
    if let Some(base) = url.strip_suffix("/api/v3") {
        return format!("{base}/api/v2{JSONRPC_SUFFIX}");
    }
    format!("{url}{JSONRPC_SUFFIX}")
}

/// Generic rule for custom and unrecognized families: only bare hosts and
/// `/api/v2`-shaped paths get the suffix; an explicit custom path is
/// trusted as given.
fn normalize_generic(url: &str) -> String {
    if ends_with_jsonrpc(url) {
        return url.to_string();
    }
    if let Some(base) = url.strip_suffix("/api/v3") {
        return format!("{base}/api/v2{JSONRPC_SUFFIX}");
    }
    if url.ends_with("/api/v2") || path_of(url).is_empty() {
        return format!("{url}{JSONRPC_SUFFIX}");
    }
    url.to_string()
}

/// `/jsonrpc` matching is case-insensitive; the canonical spelling is
/// `/jsonRPC`, but an endpoint already carrying any casing is left alone.
fn ends_with_jsonrpc(url: &str) -> bool {
    let bytes = url.as_bytes();
    let suffix = JSONRPC_SUFFIX.as_bytes();
    bytes.len() >= suffix.len()
        && bytes[bytes.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

fn ends_with_segment(url: &str, segment: &str) -> bool {
    url.ends_with(segment)
}

/// Strips a single trailing slash (not repeated, matching the source rule).
fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(index) => &url[..index],
        None => url,
    }
}

/// The path component of `url`, or `""` when there is none (including
/// non-URL inputs, which are treated as opaque hosts).
fn path_of(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return "";
    };
    let rest = &url[scheme_end + 3..];
    match rest.find('/') {
        Some(index) => &rest[index..],
        None => "",
    }
}
