// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn zero_rate_never_waits() {
    let limiter = RateLimiter::new(0.0);
    let cancel = CancellationToken::new();
    for _ in 0..100 {
        limiter.wait(&cancel).await.unwrap();
    }
}

#[tokio::test]
async fn burst_up_to_capacity_then_throttles() {
    let limiter = RateLimiter::new(10.0);
    let cancel = CancellationToken::new();

    let start = std::time::Instant::now();
    // The bucket starts full with one second's worth of tokens
    for _ in 0..10 {
        limiter.wait(&cancel).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(50), "burst should not sleep");

    // The eleventh must wait for a refill (~100ms at 10 rps)
    limiter.wait(&cancel).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(80), "sustained rate is limited");
}

#[tokio::test]
async fn cancellation_interrupts_the_wait() {
    let limiter = Arc::new(RateLimiter::new(0.001));
    let cancel = CancellationToken::new();
    limiter.wait(&cancel).await.unwrap(); // drain the single token

    let c = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        c.cancel();
    });
    let err = limiter.wait(&cancel).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
}
