//! Failover Backoff Policy
//!
//! Exponential backoff with jitter applied between bounded connect
//! attempts while a subscription is failing over. Reset after any
//! successful connect.

use std::time::Duration;

use rand::Rng;

/// Configuration for failover backoff behavior.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential growth.
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Exponential backoff with jitter.
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    current_delay: Duration,
}

impl BackoffPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
        }
    }

    /// Get the next delay, growing the internal delay for later calls.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.apply_jitter(self.current_delay);

        let scaled = self.current_delay.as_millis() as f64 * self.config.multiplier;
        let capped = if scaled.is_finite() && scaled > 0.0 {
            (scaled as u64).min(self.config.max_delay.as_millis() as u64)
        } else {
            self.config.max_delay.as_millis() as u64
        };
        self.current_delay = Duration::from_millis(capped);

        delay
    }

    /// Reset after a successful connect.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted = (base_millis + jitter).max(1.0);

        Duration::from_millis(adjusted as u64)
    }
}
