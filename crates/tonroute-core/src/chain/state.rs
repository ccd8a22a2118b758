//! Per-network highest-seqno counters.

use crate::types::Network;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Highest masterchain seqno observed per network.
///
/// # Thread Safety
///
/// Updates are monotonic and lock-free: a successful probe reporting a
/// lower seqno than the current maximum is dropped. Readers never observe
/// a regression.
#[derive(Debug, Default)]
pub struct ChainTips {
    testnet: AtomicU64,
    mainnet: AtomicU64,
}

impl ChainTips {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, network: Network) -> &AtomicU64 {
        match network {
            Network::Testnet => &self.testnet,
            Network::Mainnet => &self.mainnet,
        }
    }

    /// Returns the highest seqno seen on `network`, or 0 if none yet.
    #[inline]
    #[must_use]
    pub fn highest(&self, network: Network) -> u64 {
        self.slot(network).load(Ordering::Acquire)
    }

    /// Records a seqno observed on `network`.
    ///
    /// Returns `true` if the recorded value advanced the tip. Regressions
    /// are dropped, keeping the counter non-decreasing across probes.
    pub fn record(&self, network: Network, seqno: u64) -> bool {
        let previous = self.slot(network).fetch_max(seqno, Ordering::AcqRel);
        let advanced = seqno > previous;
        if advanced {
            trace!(network = %network, seqno = seqno, "chain tip advanced");
        }
        advanced
    }

    /// How many blocks `seqno` trails the network tip. Never negative; a
    /// provider ahead of the recorded tip reads as zero behind.
    #[must_use]
    pub fn blocks_behind(&self, network: Network, seqno: u64) -> u64 {
        self.highest(network).saturating_sub(seqno)
    }
}
