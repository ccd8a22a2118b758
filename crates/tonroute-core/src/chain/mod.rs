//! Shared chain-tip tracking.
//!
//! [`ChainTips`] is the single source of truth for the highest masterchain
//! seqno observed per network. The health checker writes to it after every
//! successful probe; the selector reads it to compute freshness.

pub mod state;

pub use state::ChainTips;
