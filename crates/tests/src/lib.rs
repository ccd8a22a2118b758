//! Integration and scenario tests for tonroute.
//!
//! Test modules:
//!
//! - `failover_tests`: multi-provider selection, 429 demotion, cooldown
//!   recovery, stale-tip fallback
//! - `ratelimit_tests`: token-bucket boundary timings and the throttle
//!   backoff ladder
//! - `health_tests`: probe envelope tolerance, failure classification,
//!   the OnFinality public-endpoint retry, CORS detection
//! - `selector_tests`: custom-endpoint bypass, manual pinning, browser
//!   filtering
//! - `manager_tests`: caller-reported error flows, hard-coded fallback,
//!   state subscription
//! - `mock_infrastructure`: reusable mockito wrapper speaking the TON
//!   `getMasterchainInfo` dialects
//!
//! Run with `cargo test --package tests`. Everything is mock-backed; no
//! network access or live endpoints are required.

#[cfg(test)]
mod failover_tests;


#[cfg(test)]
mod manager_tests;

#[cfg(test)]
mod ratelimit_tests;

#[cfg(test)]
mod selector_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
