// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token-bucket limiter for outbound bridge requests

use super::ReconcileError;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Token bucket refilled at `rps` tokens per second with burst capacity
/// of one second's worth. A rate of 0 disables limiting.
pub struct RateLimiter {
    state: Mutex<BucketState>,
    rps: f64,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    pub fn new(rps: f64) -> Self {
        Self {
            state: Mutex::new(BucketState { tokens: rps.max(1.0), refilled_at: Instant::now() }),
            rps,
        }
    }

    /// Take one token, sleeping until one is available or `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), ReconcileError> {
        if self.rps <= 0.0 {
            return Ok(());
        }
        loop {
            let wait_for = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rps).min(self.rps.max(1.0));
                state.refilled_at = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rps)
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
                _ = tokio::time::sleep(wait_for) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
