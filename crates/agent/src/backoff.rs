// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect delay policy: exponential growth with saturation and
//! uniform jitter.

use std::time::Duration;

/// Attempt `k` sleeps `base · 2^(k-1)` capped at `max`, each scaled by a
/// uniform factor in `[1 - jitter, 1 + jitter]`. A successful
/// authentication resets the sequence to `base`.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base_secs: u64, max_secs: u64, jitter: f64) -> Self {
        Self {
            base: Duration::from_secs(base_secs.max(1)),
            max: Duration::from_secs(max_secs.max(1)),
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// Delay before the next reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        // Exponent saturates well past any realistic max delay.
        let exp = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let raw = self.base.saturating_mul(2u32.saturating_pow(exp)).min(self.max);
        let spread = if self.jitter > 0.0 {
            rand::random_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let jittered = raw.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(jittered.max(1.0))
    }

    /// Reset after a successful authentication.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
