//! Token bucket with lazy, timer-free refill.
//!
//! Tokens accrue at `rate` per second up to `capacity`. Accrual is computed
//! on every accounting pass from the time elapsed since the previous one, so
//! a bucket left idle for an hour is exactly as correct as one polled every
//! millisecond, and there is no background task to start or shut down.
//!
//! All read-modify-write of the token count happens under one
//! `parking_lot::Mutex`. Blocking waits sleep with the lock released.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{Result, TollgateError};

/// Upper bound on a single sleep while waiting for tokens.
///
/// Waits longer than this are split so that a rate increase made in the
/// meantime shortens the remaining wait.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(1);

/// Slack for floating point drift when comparing token counts.
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(capacity);
        self.last_refill = now;
    }

    fn wait_for(&self, n: u32) -> Duration {
        let missing = f64::from(n) - self.tokens;
        if missing <= EPSILON {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(missing / self.rate).unwrap_or(Duration::MAX)
    }
}

/// Outcome of one accounting pass.
enum Attempt {
    Granted,
    Wait(Duration),
}

/// Fixed-capacity token bucket.
///
/// The bucket starts full. Over any window of length `T` it grants at most
/// `capacity + rate * T` tokens, regardless of how many tasks call it.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// Fails with [`TollgateError::Configuration`] if `capacity` is zero or
    /// `rate` is not a positive finite number.
    pub fn new(rate: f64, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(TollgateError::Configuration(
                "token bucket capacity must be at least 1".into(),
            ));
        }
        validate_rate(rate)?;
        Ok(Self {
            capacity,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                rate,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Maximum burst size.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Current refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Change the refill rate.
    ///
    /// Tokens accrued so far are settled at the old rate first, so the new
    /// rate only applies from this instant on.
    pub fn set_rate(&self, rate: f64) -> Result<()> {
        validate_rate(rate)?;
        let mut state = self.state.lock();
        state.refill(f64::from(self.capacity), Instant::now());
        state.rate = rate;
        Ok(())
    }

    /// Tokens currently available (fractional).
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(f64::from(self.capacity), Instant::now());
        state.tokens
    }

    /// Estimated time until `n` tokens are available; zero if they are now.
    ///
    /// Advisory only: concurrent callers may take the tokens first.
    pub fn wait_time(&self, n: u32) -> Duration {
        let mut state = self.state.lock();
        state.refill(f64::from(self.capacity), Instant::now());
        state.wait_for(n)
    }

    /// Take `n` tokens without waiting.
    ///
    /// Fails with [`TollgateError::QuotaUnavailable`] if too few are available.
    pub fn try_consume(&self, n: u32) -> Result<()> {
        self.check_request(n)?;
        match self.attempt(n, Instant::now()) {
            Attempt::Granted => Ok(()),
            Attempt::Wait(_) => Err(TollgateError::QuotaUnavailable),
        }
    }

    /// Take `n` tokens, suspending until they are available.
    ///
    /// With a `deadline`, fails with [`TollgateError::Timeout`] as soon as it
    /// is clear the tokens cannot be had in time. A timed-out call consumes
    /// nothing. Tokens already available are granted even if the deadline
    /// has passed; the deadline only bounds waiting.
    pub async fn consume(&self, n: u32, deadline: Option<Instant>) -> Result<()> {
        self.check_request(n)?;
        loop {
            let now = Instant::now();
            let wait = match self.attempt(n, now) {
                Attempt::Granted => return Ok(()),
                Attempt::Wait(wait) => wait,
            };
            if let Some(deadline) = deadline {
                let ready_at = now.checked_add(wait);
                if ready_at.is_none_or(|at| at > deadline) {
                    return Err(TollgateError::Timeout);
                }
            }
            // Re-run the accounting after every slice: the rate may have
            // changed and other callers may have taken tokens meanwhile.
            tokio::time::sleep(wait.min(MAX_WAIT_SLICE)).await;
        }
    }

    fn check_request(&self, n: u32) -> Result<()> {
        if n > self.capacity {
            return Err(TollgateError::InvalidInput(format!(
                "requested {n} tokens from a bucket of capacity {}",
                self.capacity
            )));
        }
        Ok(())
    }

    fn attempt(&self, n: u32, now: Instant) -> Attempt {
        let mut state = self.state.lock();
        state.refill(f64::from(self.capacity), now);
        let needed = f64::from(n);
        if state.tokens + EPSILON >= needed {
            state.tokens = (state.tokens - needed).max(0.0);
            Attempt::Granted
        } else {
            Attempt::Wait(state.wait_for(n))
        }
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(TollgateError::Configuration(format!(
            "refill rate must be a positive number, got {rate}"
        )));
    }
    Ok(())
}
