//! Provider families: the vendor-specific dialects.
//!
//! A family decides three things about a provider: the shape of its
//! endpoint URL (see [`super::normalize`]), its authentication convention
//! (which header carries the credential, if any), and whether a credential
//! is mandatory at all. This module is the only place those conventions
//! live.

use serde::{Deserialize, Serialize};

/// Known provider families.
///
/// Unknown strings in configuration deserialize to [`ProviderType::Custom`]
/// and get the generic endpoint and auth handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Toncenter,
    Chainstack,
    Quicknode,
    Orbs,
    Onfinality,
    Getblock,
    Tatum,
    Ankr,
    Tonhub,
    #[serde(other)]
    Custom,
}

impl ProviderType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Toncenter => "toncenter",
            ProviderType::Chainstack => "chainstack",
            ProviderType::Quicknode => "quicknode",
            ProviderType::Orbs => "orbs",
            ProviderType::Onfinality => "onfinality",
            ProviderType::Getblock => "getblock",
            ProviderType::Tatum => "tatum",
            ProviderType::Ankr => "ankr",
            ProviderType::Tonhub => "tonhub",
            ProviderType::Custom => "custom",
        }
    }

    /// Whether a request against this family cannot succeed without a
    /// header credential. Tatum's gateway rejects anonymous requests
    /// outright, so probing without a key fails early with a clear cause.
    #[must_use]
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderType::Tatum)
    }

    /// Whether the real endpoint is normally discovered at runtime.
    #[must_use]
    pub fn is_dynamic_by_default(&self) -> bool {
        matches!(self, ProviderType::Orbs)
    }

    /// Builds the auth headers for a request to this family.
    ///
    /// Families that put the key in the URL (chainstack, quicknode) send no
    /// headers; getblock sends the key both in the path and in `x-api-key`.
    #[must_use]
    pub fn auth_headers(&self, api_key: Option<&str>) -> Vec<(&'static str, String)> {
        let Some(key) = api_key else {
            return Vec::new();
        };

        match self {
            ProviderType::Getblock | ProviderType::Tatum => {
                vec![("x-api-key", key.to_string())]
            }
            ProviderType::Onfinality => vec![("apikey", key.to_string())],
            ProviderType::Ankr | ProviderType::Tonhub | ProviderType::Custom => {
                vec![("x-api-key", key.to_string())]
            }
            ProviderType::Toncenter
            | ProviderType::Chainstack
            | ProviderType::Quicknode
            | ProviderType::Orbs => Vec::new(),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
