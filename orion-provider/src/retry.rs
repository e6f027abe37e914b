//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Per-path retry accounting: `base * 2^attempts`, capped, plus up to 50%
/// jitter. The polling and streaming paths each own one of these so a
/// flaky stream doesn't block poll recovery and vice versa.
#[derive(Debug)]
pub struct RetryBudget {
    base: Duration,
    cap: Duration,
    attempts: u32,
}

impl RetryBudget {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next attempt, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempts.min(16);
        let stepped = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap);
        self.attempts = self.attempts.saturating_add(1);
        let jitter = stepped.mul_f64(rand::rng().random_range(0.0..0.5));
        stepped + jitter
    }
}
