//! Tollgate - adaptive rate limiting and tiered response caching for
//! quota-bound HTTP APIs
//!
//! Every outbound call goes through a [`RequestGate`]. The gate answers from
//! its cache when it can; otherwise it paces the call through a token bucket
//! whose rate an [`AdaptiveController`] retunes from the API's own feedback
//! (HTTP 429), backs off and retries on quota violations, and stores the
//! result for next time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tollgate::{CacheConfig, HttpConfig, RateLimitConfig, RequestParams, Tollgate};
//!
//! #[tokio::main]
//! async fn main() -> tollgate::Result<()> {
//!     let gate = Tollgate::builder()
//!         .http(HttpConfig::new("https://api.example.com/search").api_key("secret"))
//!         .rate_limit(RateLimitConfig::new().tokens_per_second(0.2).burst_capacity(5))
//!         .cache(CacheConfig::new().ttl(Duration::from_secs(3600)).disk_dir(".cache"))
//!         .build()?;
//!
//!     let params = RequestParams::new()
//!         .with("location", "Austin, TX")
//!         .with("page", 1);
//!     let response = gate.execute(&params, None).await?;
//!
//!     println!("cached: {}", response.cached);
//!     println!("{}", response.payload.text());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod limiter;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{Result, TollgateError};
pub use gate::{GateBuilder, RequestGate, Tollgate};
pub use version::{PKG_VERSION, version_string};

pub use cache::{
    CacheConfig, CacheKey, CacheStats, CleanupReport, KeyBuilder, TieredCache, default_disk_dir,
};
pub use config::Config;
pub use limiter::{
    AdaptiveController, BackoffConfig, LimiterStats, Outcome, RateLimitConfig, TokenBucket,
};
pub use transport::{HttpConfig, HttpTransport, Transport, TransportResponse};
pub use types::{GateResponse, ParamValue, Payload, RequestParams};
