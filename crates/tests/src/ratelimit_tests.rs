//! Token-bucket boundary timings and the throttle backoff ladder.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tonroute_core::provider::{ProviderRateLimiter, RateLimitConfig, RateLimiterPool};

fn config(rps: u32, burst: u32, min_delay_ms: u64, max_backoff_ms: u64) -> RateLimitConfig {
    RateLimitConfig {
        rps,
        burst_size: burst,
        min_delay_ms,
        backoff_multiplier: 2.0,
        max_backoff_ms,
    }
}

#[tokio::test]
async fn test_one_rps_three_acquires_span_two_refill_windows() {
    let limiter = ProviderRateLimiter::new(config(1, 1, 1000, 30_000));
    let start = Instant::now();

    for attempt in 0..3 {
        assert!(limiter.acquire(Duration::from_secs(5)).await, "attempt {attempt}");
    }

    assert!(
        start.elapsed() >= Duration::from_millis(2000),
        "third acquire completed too early: {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_burst_capacity_is_consumed_without_refill_waits() {
    let limiter = ProviderRateLimiter::new(config(25, 30, 44, 30_000));
    let start = Instant::now();

    for attempt in 0..30 {
        assert!(limiter.acquire(Duration::from_secs(2)).await, "attempt {attempt}");
    }

    // The whole burst drains in well under a refill window
    assert!(start.elapsed() < Duration::from_millis(200), "burst took {:?}", start.elapsed());

    // The 31st must wait for a token (~one 1/rps window)
    let start = Instant::now();
    assert!(limiter.acquire(Duration::from_secs(2)).await);
    assert!(
        start.elapsed() >= Duration::from_millis(25),
        "31st acquire returned too early: {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_429_backoff_delays_the_next_acquire() {
    // rps=10, minDelay=100, multiplier=2: one 429 raises backoff to 200ms
    let limiter = ProviderRateLimiter::new(config(10, 15, 100, 30_000));

    assert!(limiter.acquire(Duration::from_secs(1)).await);
    limiter.report_rate_limit_error();
    assert_eq!(limiter.snapshot().current_backoff_ms, 200);

    let start = Instant::now();
    assert!(limiter.acquire(Duration::from_secs(5)).await);
    assert!(
        start.elapsed() >= Duration::from_millis(200),
        "acquire returned before the backoff elapsed: {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_backoff_ladder_grows_and_caps() {
    let limiter = ProviderRateLimiter::new(config(10, 15, 100, 800));

    let mut expected = [200u64, 400, 800, 800].into_iter();
    for step in 0..4 {
        limiter.report_rate_limit_error();
        assert_eq!(
            limiter.snapshot().current_backoff_ms,
            expected.next().unwrap(),
            "step {step}"
        );
    }
}

#[tokio::test]
async fn test_timed_out_waiter_leaves_the_queue_consistent() {
    let limiter = Arc::new(ProviderRateLimiter::new(config(1, 1, 1000, 30_000)));

    // Drain the bucket; the holder finishes quickly
    assert!(limiter.acquire(Duration::from_secs(1)).await);

    // One impatient waiter, one patient one
    let impatient = {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move { limiter.acquire(Duration::from_millis(50)).await })
    };
    let patient = {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move { limiter.acquire(Duration::from_secs(5)).await })
    };

    assert!(!impatient.await.unwrap(), "impatient waiter should time out");
    assert!(patient.await.unwrap(), "patient waiter should eventually acquire");

    let snapshot = limiter.snapshot();
    assert_eq!(snapshot.queued_waiters, 0);
    assert!(!snapshot.processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_cross_provider_throttling() {
    let pool = Arc::new(RateLimiterPool::new());

    let throttled = pool.get_or_create("throttled", 10);
    let free = pool.get_or_create("free", 10);

    for _ in 0..5 {
        throttled.report_rate_limit_error();
    }

    // The sibling provider is untouched and serves its burst instantly
    let start = Instant::now();
    for _ in 0..10 {
        assert!(free.acquire(Duration::from_secs(1)).await);
    }
    assert!(start.elapsed() < Duration::from_millis(200));

    assert!(throttled.snapshot().current_backoff_ms > 0);
    assert_eq!(free.snapshot().current_backoff_ms, 0);
}
