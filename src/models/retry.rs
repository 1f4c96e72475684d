use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff policy for failed sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total send attempts per delivery, the first one included.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 30_000,
            max_delay_ms: 600_000,
            backoff_multiplier: 2,
        }
    }
}

impl RetryConfig {
    /// Base delay before the attempt following `attempts_made` failures.
    pub fn base_delay(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1);
        let factor = self.backoff_multiplier.saturating_pow(exponent);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// `base_delay` with +/-10% jitter.
    pub fn jittered_delay(&self, attempts_made: u32) -> Duration {
        let base = self.base_delay(attempts_made).as_millis() as f64;
        let jitter = rand::random_range(-0.1..=0.1);
        Duration::from_millis((base * (1.0 + jitter)) as u64)
    }

    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
