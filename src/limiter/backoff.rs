//! Backoff configuration and delay calculation for quota violations.
//!
//! Attempt `k` (0-indexed) waits `min(base_backoff * multiplier^k, max_backoff)`,
//! then jitter of up to `±jitter_factor` of that value is applied. A
//! `Retry-After` hint from the provider replaces the computed value outright.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::config::duration_secs;
use crate::{Result, TollgateError};

/// Configuration for retry behaviour after quota violations.
///
/// ```rust
/// # use tollgate::BackoffConfig;
/// # use std::time::Duration;
/// let config = BackoffConfig::new()
///     .base_backoff(Duration::from_secs(5))
///     .max_backoff(Duration::from_secs(60))
///     .max_retries(4);
/// assert_eq!(config.delay_for_attempt(2), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the first retry. Default: 5s.
    #[serde(rename = "base_backoff_secs", with = "duration_secs")]
    pub base_backoff: Duration,
    /// Cap on the computed delay. Default: 60s.
    #[serde(rename = "max_backoff_secs", with = "duration_secs")]
    pub max_backoff: Duration,
    /// Growth factor per attempt. Default: 2.0.
    pub multiplier: f64,
    /// Relative jitter applied to computed delays, in `[0, 1)`. Default: 0.1.
    pub jitter_factor: f64,
    /// Retries after the initial request. Default: 5.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_retries: 5,
        }
    }
}

impl BackoffConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before the first retry.
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    /// Set the cap on computed delays.
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the growth factor per attempt.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the relative jitter. `0.0` disables jitter.
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Set the number of retries after the initial request.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Check the configuration for values that would make backoff meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(TollgateError::Configuration(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(TollgateError::Configuration(format!(
                "jitter factor must be in [0, 1), got {}",
                self.jitter_factor
            )));
        }
        if self.base_backoff > self.max_backoff {
            return Err(TollgateError::Configuration(
                "base backoff exceeds max backoff".into(),
            ));
        }
        Ok(())
    }

    /// Delay for a given attempt (0-indexed), before jitter.
    ///
    /// Non-decreasing in `attempt` and never above `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_backoff.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_backoff;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_backoff)
    }

    /// Apply uniform random jitter of `±jitter_factor` to `delay`.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let spread = rand::rng().random_range(-self.jitter_factor..=self.jitter_factor);
        delay.mul_f64((1.0 + spread).max(0.0))
    }

    /// The delay to actually sleep before retrying after attempt `attempt`.
    ///
    /// A provider `retry_after` hint takes precedence over the computed,
    /// jittered backoff.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.jittered(self.delay_for_attempt(attempt)))
    }
}
