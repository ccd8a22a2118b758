//! Per-provider rate limiting.
//!
//! Token-bucket semantics with a minimum-delay floor and exponential
//! backoff on explicit throttle signals. Each provider owns an independent
//! limiter; a 429 on provider A never throttles provider B.
//!
//! # Concurrency contract
//!
//! `acquire` calls against one provider are serialized: at most one caller
//! is inside the critical section at a time, and waiters are admitted in
//! FIFO order. The mutex is never held across a sleep - waiting callers
//! park on a oneshot grant, and the holder hands the critical section to
//! the head of the queue on release.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;
use tracing::debug;

/// Sleep granularity inside the token wait loop.
const WAIT_SLICE_MS: u64 = 100;

/// Tuning for one provider's limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Declared sustainable requests per second.
    pub rps: u32,
    /// Token bucket capacity.
    pub burst_size: u32,
    /// Floor on spacing between consumes once the bucket drains.
    pub min_delay_ms: u64,
    /// Backoff growth factor applied per throttle signal.
    pub backoff_multiplier: f64,
    /// Backoff ceiling.
    pub max_backoff_ms: u64,
}

impl RateLimitConfig {
    /// Derives limiter sizing from a provider's declared RPS.
    ///
    /// Very-low-RPS providers (<= 3) cannot tolerate bursting and get a
    /// 20% spacing margin; higher-RPS providers absorb a 1.5x burst with a
    /// 10% margin.
    #[must_use]
    pub fn from_rps(rps: u32) -> Self {
        let rps = rps.max(1);
        let rps_f = f64::from(rps);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (burst_size, min_delay_ms) = if rps <= 3 {
            (1, (1000.0 / rps_f * 1.2).ceil() as u64)
        } else if rps <= 5 {
            (2, (1000.0 / rps_f * 1.2).ceil() as u64)
        } else {
            ((rps_f * 1.5).ceil().max(3.0) as u32, (1000.0 / rps_f * 1.1).ceil() as u64)
        };

        Self {
            rps,
            burst_size,
            min_delay_ms,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }

    fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Point-in-time view of a limiter, exposed through manager state.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSnapshot {
    pub tokens: f64,
    pub current_backoff_ms: u64,
    pub consecutive_errors: u32,
    pub processing: bool,
    pub queued_waiters: usize,
}

/// Mutable limiter state under a single lock.
struct Inner {
    tokens: f64,
    last_refill: Instant,
    /// Completion time of the previous consume; spacing is measured from it.
    last_acquire: Option<Instant>,
    current_backoff: Duration,
    consecutive_errors: u32,
    processing: bool,
    waiters: VecDeque<(u64, oneshot::Sender<()>)>,
    next_waiter_id: u64,
}

impl Inner {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            tokens: f64::from(config.burst_size),
            last_refill: Instant::now(),
            last_acquire: None,
            current_backoff: Duration::ZERO,
            consecutive_errors: 0,
            processing: false,
            waiters: VecDeque::new(),
            next_waiter_id: 0,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens =
            (self.tokens + elapsed * f64::from(config.rps)).min(f64::from(config.burst_size));
        self.last_refill = now;
    }

    /// Releases the critical section, handing it to the next waiter if any.
    fn release(&mut self) {
        while let Some((_, waiter)) = self.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                // processing stays true; ownership moved to the waiter
                return;
            }
            // receiver gave up; try the next one
        }
        self.processing = false;
    }
}

/// Token-bucket rate limiter for a single provider.
pub struct ProviderRateLimiter {
    config: RwLock<RateLimitConfig>,
    inner: Mutex<Inner>,
}

impl ProviderRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let inner = Inner::new(&config);
        Self { config: RwLock::new(config), inner: Mutex::new(inner) }
    }

    /// Acquires one token, waiting at most `timeout`.
    ///
    /// Returns `true` when a token was consumed. Returns `false` when the
    /// deadline elapsed first - while queued behind other callers, while a
    /// throttle backoff is pending, or while the bucket stayed empty.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        // Admission: FIFO behind the current holder of the critical section.
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.processing {
                let (grant_tx, grant_rx) = oneshot::channel();
                let waiter_id = inner.next_waiter_id;
                inner.next_waiter_id += 1;
                inner.waiters.push_back((waiter_id, grant_tx));
                Some((waiter_id, grant_rx))
            } else {
                inner.processing = true;
                None
            }
        };

        if let Some((waiter_id, grant_rx)) = waiter {
            let admitted = tokio::time::timeout_at(
                tokio::time::Instant::from_std(deadline),
                grant_rx,
            )
            .await;

            match admitted {
                Ok(Ok(())) => {}
                _ => {
                    let mut inner = self.inner.lock();
                    let still_queued = inner.waiters.iter().any(|(id, _)| *id == waiter_id);
                    if still_queued {
                        inner.waiters.retain(|(id, _)| *id != waiter_id);
                    } else {
                        // The grant raced our timeout; we own the
                        // critical section and must pass it on.
                        inner.release();
                    }
                    return false;
                }
            }
        }

        self.acquire_admitted(deadline).await
    }

    /// Body of `acquire` once the critical section is owned. Every return
    /// path releases it.
    async fn acquire_admitted(&self, deadline: Instant) -> bool {
        let config = self.config.read().clone();

        // A pending throttle backoff is served before any token math.
        let backoff = {
            let mut inner = self.inner.lock();
            inner.refill(&config);
            inner.current_backoff
        };
        if backoff > Duration::ZERO {
            if Instant::now() + backoff > deadline {
                // Not cleared on timeout; the next acquire serves it in full.
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                let mut inner = self.inner.lock();
                inner.release();
                return false;
            }
            tokio::time::sleep(backoff).await;
            let mut inner = self.inner.lock();
            inner.current_backoff = Duration::ZERO;
            inner.last_refill = Instant::now();
        }

        // Wait for a token.
        loop {
            {
                let mut inner = self.inner.lock();
                inner.refill(&config);
                if inner.tokens >= 1.0 {
                    break;
                }
                if Instant::now() >= deadline {
                    inner.release();
                    return false;
                }
            }
            let slice = Duration::from_millis(WAIT_SLICE_MS.min(config.min_delay_ms.max(1)));
            tokio::time::sleep(slice).await;
        }

        // Consume, then enforce the spacing floor once the bucket is drained.
        let spacing = {
            let mut inner = self.inner.lock();
            inner.tokens -= 1.0;
            if inner.tokens < 1.0 {
                match inner.last_acquire {
                    Some(last) => config.min_delay().saturating_sub(last.elapsed()),
                    None => Duration::ZERO,
                }
            } else {
                Duration::ZERO
            }
        };
        if spacing > Duration::ZERO {
            tokio::time::sleep(spacing).await;
        }

        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_refill = now;
        inner.last_acquire = Some(now);
        inner.release();
        true
    }

    /// Clears backoff and the consecutive-error counter.
    pub fn report_success(&self) {
        let mut inner = self.inner.lock();
        inner.current_backoff = Duration::ZERO;
        inner.consecutive_errors = 0;
    }

    /// Records an explicit throttle signal (HTTP 429 or rate-limit text).
    ///
    /// Backoff grows exponentially up to the configured ceiling, the bucket
    /// is emptied, and the refill clock restarts - the next acquire waits
    /// the full backoff plus a refill window.
    pub fn report_rate_limit_error(&self) {
        let config = self.config.read().clone();
        let mut inner = self.inner.lock();

        inner.consecutive_errors += 1;
        inner.current_backoff = if inner.current_backoff.is_zero() {
            config.min_delay().mul_f64(config.backoff_multiplier)
        } else {
            inner
                .current_backoff
                .mul_f64(config.backoff_multiplier)
                .min(config.max_backoff())
        };
        inner.tokens = 0.0;
        inner.last_refill = Instant::now();

        debug!(
            backoff_ms = inner.current_backoff.as_millis() as u64,
            consecutive_errors = inner.consecutive_errors,
            "throttle reported; backoff raised"
        );
    }

    /// Records a non-throttle failure. Three consecutive errors introduce a
    /// mild linear backoff, capped at half the throttle ceiling.
    pub fn report_error(&self) {
        let config = self.config.read().clone();
        let mut inner = self.inner.lock();

        inner.consecutive_errors += 1;
        if inner.consecutive_errors >= 3 {
            let backoff = config
                .min_delay()
                .saturating_mul(inner.consecutive_errors)
                .min(config.max_backoff() / 2);
            inner.current_backoff = backoff;
        }
    }

    /// Merges new tuning values; tokens above the new burst cap are clamped.
    pub fn update_config(&self, new_config: RateLimitConfig) {
        let mut inner = self.inner.lock();
        inner.tokens = inner.tokens.min(f64::from(new_config.burst_size));
        *self.config.write() = new_config;
    }

    /// Restores a full bucket and clears error state.
    pub fn reset(&self) {
        let config = self.config.read().clone();
        let mut inner = self.inner.lock();
        inner.tokens = f64::from(config.burst_size);
        inner.last_refill = Instant::now();
        inner.current_backoff = Duration::ZERO;
        inner.consecutive_errors = 0;
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config.read().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let inner = self.inner.lock();
        #[allow(clippy::cast_possible_truncation)]
        let current_backoff_ms = inner.current_backoff.as_millis() as u64;
        RateLimitSnapshot {
            tokens: inner.tokens,
            current_backoff_ms,
            consecutive_errors: inner.consecutive_errors,
            processing: inner.processing,
            queued_waiters: inner.waiters.len(),
        }
    }
}

/// Lazily-created limiters keyed by provider id. No global bucket exists;
/// the pool is only a lookup table.
#[derive(Default)]
pub struct RateLimiterPool {
    limiters: DashMap<String, Arc<ProviderRateLimiter>>,
}

impl RateLimiterPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a limiter with explicit tuning, replacing the config of an
    /// existing one.
    pub fn configure(&self, provider_id: &str, config: RateLimitConfig) {
        match self.limiters.get(provider_id) {
            Some(limiter) => limiter.update_config(config),
            None => {
                self.limiters
                    .insert(provider_id.to_string(), Arc::new(ProviderRateLimiter::new(config)));
            }
        }
    }

    /// Returns the limiter for `provider_id`, creating one sized from
    /// `rps` on first use.
    #[must_use]
    pub fn get_or_create(&self, provider_id: &str, rps: u32) -> Arc<ProviderRateLimiter> {
        if let Some(limiter) = self.limiters.get(provider_id) {
            return Arc::clone(limiter.value());
        }
        Arc::clone(
            self.limiters
                .entry(provider_id.to_string())
                .or_insert_with(|| {
                    Arc::new(ProviderRateLimiter::new(RateLimitConfig::from_rps(rps)))
                })
                .value(),
        )
    }

    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<Arc<ProviderRateLimiter>> {
        self.limiters.get(provider_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshots every limiter, for the manager's state view.
    #[must_use]
    pub fn snapshot_all(&self) -> std::collections::HashMap<String, RateLimitSnapshot> {
        self.limiters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}
