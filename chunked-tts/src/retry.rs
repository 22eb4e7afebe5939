//! Retry policy and per-worker circuit breaker

use rand::Rng;
use std::time::Duration;

use crate::error::ErrorClass;

const CONNECTION_MULTIPLIER: f64 = 1.5;

/// Exponential backoff with jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added as random jitter (0.0 - 1.0)
    pub jitter_fraction: f64,
    /// Attempts per chunk, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.5,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt` (1-based).
    ///
    /// `jitter_sample` is a value in `[0, 1)`; passing it in keeps this
    /// function deterministic.
    pub fn compute_delay(&self, attempt: u32, class: ErrorClass, jitter_sample: f64) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let mut delay = (self.base_delay.as_secs_f64() * 2f64.powi(exponent)).min(max);

        if class == ErrorClass::Connection {
            delay = (delay * CONNECTION_MULTIPLIER).min(max);
        }

        let jitter = delay * self.jitter_fraction * jitter_sample.clamp(0.0, 1.0);
        Duration::from_secs_f64(delay + jitter)
    }

    /// `compute_delay` with a random jitter sample
    pub fn delay(&self, attempt: u32, class: ErrorClass) -> Duration {
        let sample: f64 = rand::rng().random();
        self.compute_delay(attempt, class, sample)
    }

    /// The same policy with one extra attempt, for the recovery pass
    pub fn for_recovery(&self) -> Self {
        Self {
            max_attempts: self.max_attempts + 1,
            ..*self
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failed attempts that trip the breaker
    pub threshold: u32,
    /// Pause before the worker reconnects
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Per-worker consecutive failure counter
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failed attempt. Returns true when the breaker trips; the
    /// counter is reset so the next trip needs a fresh run of failures.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        if self.settings.threshold > 0 && self.consecutive_failures >= self.settings.threshold {
            self.consecutive_failures = 0;
            true
        } else {
            false
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cooldown(&self) -> Duration {
        self.settings.cooldown
    }
}
