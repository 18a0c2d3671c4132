//! Adaptive rate control on top of a [`TokenBucket`].
//!
//! The controller watches request outcomes and retunes the bucket's refill
//! rate (AIMD-style):
//! - `success_threshold` consecutive successes raise the rate by
//!   `increase_factor` (default +10%), clamped to `max_rate`
//! - `failure_threshold` consecutive quota violations cut the rate by
//!   `decrease_factor` (default 50%), clamped to `min_rate`
//!
//! Non-quota failures are reported but never move the rate. The only
//! feedback signal is the provider's quota violation, so `max_rate` should
//! sit safely below the provider's real limit; by default it equals the
//! configured starting rate.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use super::backoff::BackoffConfig;
use super::bucket::TokenBucket;
use crate::telemetry;
use crate::{Result, TollgateError};

/// Acquisition timestamps kept for requests-per-minute reporting.
const RECENT_REQUESTS_MAX: usize = 100;
const RECENT_REQUESTS_WINDOW: Duration = Duration::from_secs(60);

/// Rate-limit configuration for one target API.
///
/// ```rust
/// # use tollgate::RateLimitConfig;
/// let config = RateLimitConfig::new()
///     .tokens_per_second(0.2)
///     .burst_capacity(5)
///     .max_rate(0.25);
/// assert_eq!(config.effective_max_rate(), 0.25);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Starting refill rate. Default: 0.2 (one request every 5 seconds).
    pub tokens_per_second: f64,
    /// Bucket capacity (maximum burst). Default: 5.
    pub burst_capacity: u32,
    /// Whether outcomes retune the rate. Default: true.
    pub adaptive: bool,
    /// Floor for rate decreases. Default: 0.01 (capped at the starting rate).
    pub min_rate: Option<f64>,
    /// Ceiling for rate increases. Default: the starting rate.
    pub max_rate: Option<f64>,
    /// Consecutive successes before a rate increase. Default: 10.
    pub success_threshold: u32,
    /// Consecutive quota violations before a rate decrease. Default: 2.
    pub failure_threshold: u32,
    /// Multiplier applied on increase. Default: 1.1.
    pub increase_factor: f64,
    /// Multiplier applied on decrease. Default: 0.5.
    pub decrease_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_second: 0.2,
            burst_capacity: 5,
            adaptive: true,
            min_rate: None,
            max_rate: None,
            success_threshold: 10,
            failure_threshold: 2,
            increase_factor: 1.1,
            decrease_factor: 0.5,
        }
    }
}

impl RateLimitConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting refill rate.
    pub fn tokens_per_second(mut self, rate: f64) -> Self {
        self.tokens_per_second = rate;
        self
    }

    /// Set the bucket capacity.
    pub fn burst_capacity(mut self, capacity: u32) -> Self {
        self.burst_capacity = capacity;
        self
    }

    /// Enable or disable rate adaptation.
    pub fn adaptive(mut self, enabled: bool) -> Self {
        self.adaptive = enabled;
        self
    }

    /// Set the floor for rate decreases.
    pub fn min_rate(mut self, rate: f64) -> Self {
        self.min_rate = Some(rate);
        self
    }

    /// Set the ceiling for rate increases.
    pub fn max_rate(mut self, rate: f64) -> Self {
        self.max_rate = Some(rate);
        self
    }

    /// Set how many consecutive successes trigger an increase.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Set how many consecutive quota violations trigger a decrease.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Resolved floor: explicit `min_rate`, else `0.01` (never above the starting rate).
    pub fn effective_min_rate(&self) -> f64 {
        self.min_rate
            .unwrap_or_else(|| 0.01_f64.min(self.tokens_per_second))
    }

    /// Resolved ceiling: explicit `max_rate`, else the starting rate.
    pub fn effective_max_rate(&self) -> f64 {
        self.max_rate.unwrap_or(self.tokens_per_second)
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.effective_min_rate(), self.effective_max_rate());
        if !self.tokens_per_second.is_finite() || self.tokens_per_second <= 0.0 {
            return Err(TollgateError::Configuration(format!(
                "tokens_per_second must be positive, got {}",
                self.tokens_per_second
            )));
        }
        if self.burst_capacity == 0 {
            return Err(TollgateError::Configuration(
                "burst_capacity must be at least 1".into(),
            ));
        }
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return Err(TollgateError::Configuration(format!(
                "rate bounds must satisfy 0 < min_rate <= max_rate, got [{min}, {max}]"
            )));
        }
        if !(min..=max).contains(&self.tokens_per_second) {
            return Err(TollgateError::Configuration(format!(
                "tokens_per_second {} outside [{min}, {max}]",
                self.tokens_per_second
            )));
        }
        if self.success_threshold == 0 || self.failure_threshold == 0 {
            return Err(TollgateError::Configuration(
                "adaptation thresholds must be at least 1".into(),
            ));
        }
        if !(self.increase_factor >= 1.0 && self.decrease_factor > 0.0 && self.decrease_factor <= 1.0)
        {
            return Err(TollgateError::Configuration(
                "increase_factor must be >= 1 and decrease_factor in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// What happened to one executed request, as far as rate control cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The provider signalled a quota violation (HTTP 429).
    QuotaViolation { retry_after: Option<Duration> },
    /// Any other failure. Recorded, but never moves the rate.
    OtherFailure,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub current_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub available_tokens: f64,
    pub capacity: u32,
    pub requests_last_minute: usize,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub last_retry_after: Option<Duration>,
}

#[derive(Debug, Default)]
struct ControlState {
    consecutive_successes: u32,
    consecutive_failures: u32,
    recent: VecDeque<Instant>,
    last_retry_after: Option<Duration>,
}

/// Token bucket plus the feedback loop that retunes it.
///
/// Construct one per target API and share it (e.g. behind an `Arc`) between
/// every caller of that API.
#[derive(Debug)]
pub struct AdaptiveController {
    bucket: TokenBucket,
    config: RateLimitConfig,
    backoff: BackoffConfig,
    state: Mutex<ControlState>,
}

impl AdaptiveController {
    /// Create a controller with a full bucket at the starting rate.
    pub fn new(config: RateLimitConfig, backoff: BackoffConfig) -> Result<Self> {
        config.validate()?;
        backoff.validate()?;
        let bucket = TokenBucket::new(config.tokens_per_second, config.burst_capacity)?;
        info!(
            rate = config.tokens_per_second,
            burst = config.burst_capacity,
            adaptive = config.adaptive,
            "initialized adaptive rate limiter"
        );
        metrics::gauge!(telemetry::CURRENT_RATE).set(config.tokens_per_second);
        Ok(Self {
            bucket,
            config,
            backoff,
            state: Mutex::new(ControlState::default()),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// The underlying bucket.
    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    /// Current refill rate in tokens per second.
    pub fn current_rate(&self) -> f64 {
        self.bucket.rate()
    }

    /// Wait for one token, failing with [`TollgateError::Timeout`] if it
    /// cannot be had before `deadline`.
    pub async fn acquire(&self, deadline: Option<Instant>) -> Result<()> {
        self.bucket.consume(1, deadline).await?;
        self.record_request();
        Ok(())
    }

    /// Take one token without waiting.
    pub fn try_acquire(&self) -> Result<()> {
        self.bucket.try_consume(1)?;
        self.record_request();
        Ok(())
    }

    /// Feed one request outcome into the control loop.
    pub fn report_outcome(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        match outcome {
            Outcome::Success => {
                state.consecutive_failures = 0;
                state.consecutive_successes += 1;
                if self.config.adaptive
                    && state.consecutive_successes >= self.config.success_threshold
                {
                    state.consecutive_successes = 0;
                    self.adjust(self.config.increase_factor);
                }
            }
            Outcome::QuotaViolation { retry_after } => {
                state.consecutive_successes = 0;
                state.consecutive_failures += 1;
                state.last_retry_after = retry_after;
                if self.config.adaptive
                    && state.consecutive_failures >= self.config.failure_threshold
                {
                    state.consecutive_failures = 0;
                    self.adjust(self.config.decrease_factor);
                }
            }
            Outcome::OtherFailure => {}
        }
    }

    /// How long to sleep after the quota violation on attempt `attempt`.
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        self.backoff.effective_delay(attempt, retry_after)
    }

    pub fn stats(&self) -> LimiterStats {
        let state = self.state.lock();
        let now = Instant::now();
        let requests_last_minute = state
            .recent
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < RECENT_REQUESTS_WINDOW)
            .count();
        LimiterStats {
            current_rate: self.bucket.rate(),
            min_rate: self.config.effective_min_rate(),
            max_rate: self.config.effective_max_rate(),
            available_tokens: self.bucket.available(),
            capacity: self.bucket.capacity(),
            requests_last_minute,
            consecutive_successes: state.consecutive_successes,
            consecutive_failures: state.consecutive_failures,
            last_retry_after: state.last_retry_after,
        }
    }

    fn record_request(&self) {
        let mut state = self.state.lock();
        if state.recent.len() >= RECENT_REQUESTS_MAX {
            state.recent.pop_front();
        }
        state.recent.push_back(Instant::now());
    }

    // Called with the state lock held; the bucket has its own lock and never
    // reaches back into the controller.
    fn adjust(&self, factor: f64) {
        let old = self.bucket.rate();
        let new = (old * factor).clamp(
            self.config.effective_min_rate(),
            self.config.effective_max_rate(),
        );
        if new == old {
            return;
        }
        if let Err(e) = self.bucket.set_rate(new) {
            warn!(error = %e, "rejected rate adjustment");
            return;
        }
        metrics::gauge!(telemetry::CURRENT_RATE).set(new);
        if new > old {
            metrics::counter!(telemetry::RATE_ADJUSTMENTS_TOTAL, "direction" => "up").increment(1);
            info!(old_rate = old, new_rate = new, "increased request rate");
        } else {
            metrics::counter!(telemetry::RATE_ADJUSTMENTS_TOTAL, "direction" => "down")
                .increment(1);
            warn!(
                old_rate = old,
                new_rate = new,
                "decreased request rate after quota violations"
            );
        }
    }
}
