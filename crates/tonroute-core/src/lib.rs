//! # tonroute-core
//!
//! Core library for tonroute, a multi-provider TON RPC client manager.
//!
//! Given a pool of heterogeneous RPC endpoints for the same logical TON
//! network, this crate continuously decides which endpoint each outbound
//! request should target, enforces per-provider rate limits, detects
//! unhealthy endpoints, and fails over between them. Request execution
//! itself stays with the embedding application.
//!
//! - **[`config`]**: declarative provider configuration with layered
//!   loading and whole-document validation.
//!
//! - **[`provider`]**: the core - registry, per-family endpoint
//!   normalization, per-provider token-bucket rate limiting, health
//!   probing with failure classification, scoring-based selection, and
//!   the [`provider::ProviderManager`] facade.
//!
//! - **[`chain`]**: shared per-network chain-tip (highest seqno) tracking.
//!
//! - **[`types`]**: networks, API versions, and the probe wire format.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ProviderManager                      │
//! │  ┌──────────────┐  ┌───────────────┐  ┌───────────────┐  │
//! │  │   Registry   │  │ HealthChecker │  │   Selector    │  │
//! │  └──────┬───────┘  └──────┬────────┘  └──────┬────────┘  │
//! │         │                 │                  │           │
//! │  ┌──────▼───────┐  ┌──────▼────────┐  ┌──────▼────────┐  │
//! │  │ EnvSnapshot  │  │ RateLimiters  │  │   ChainTips   │  │
//! │  │ {key} expand │  │ (per provider)│  │ (per network) │  │
//! │  └──────────────┘  └───────────────┘  └───────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tonroute_core::{
//!     config::ProvidersConfig,
//!     provider::{EnvSnapshot, ManagerOptions, ProviderManager},
//!     types::Network,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvidersConfig::load()?;
//! let manager = ProviderManager::new(
//!     &config,
//!     &EnvSnapshot::from_process(),
//!     ManagerOptions::new(Network::Mainnet),
//! )?;
//! manager.start().await;
//!
//! let url = manager.resolve_endpoint().await;
//! // ... run the JSON-RPC request against `url` ...
//! manager.report_success();
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod provider;
pub mod types;

pub use config::{ConfigError, ProviderConfig, ProvidersConfig};
pub use provider::{
    HealthResult, HealthStatus, ManagerOptions, ProviderManager, ProviderType, ResolvedProvider,
};
pub use types::{Network, RuntimeAdapter};
