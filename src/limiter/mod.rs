//! Rate limiting subsystem.
//!
//! - [`TokenBucket`]: lazy-refill bucket; the hard "at most N per second,
//!   bounded burst" guarantee.
//! - [`AdaptiveController`]: owns a bucket, retunes its rate from request
//!   outcomes, and computes backoff delays from its [`BackoffConfig`].

pub mod adaptive;
pub mod backoff;
pub mod bucket;

pub use adaptive::{AdaptiveController, LimiterStats, Outcome, RateLimitConfig};
pub use backoff::BackoffConfig;
pub use bucket::TokenBucket;
