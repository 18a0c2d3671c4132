//! Telemetry metric name constants.
//!
//! Centralised metric names for tollgate operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `tollgate_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `transport`: transport name (e.g. "http")
//! - `status`: outcome: "ok", "quota" or "error"
//! - `tier`: cache tier: "memory" or "disk"

/// Total requests executed against the transport (cache hits excluded).
///
/// Labels: `transport`, `status` ("ok" | "quota" | "error").
pub const REQUESTS_TOTAL: &str = "tollgate_requests_total";

/// Request duration in seconds, measured around the transport call.
///
/// Labels: `transport`.
pub const REQUEST_DURATION_SECONDS: &str = "tollgate_request_duration_seconds";

/// Total retry attempts after a quota violation (not counting the initial request).
///
/// Labels: `transport`.
pub const RETRIES_TOTAL: &str = "tollgate_retries_total";

/// Backoff sleeps in seconds, after jitter or retry-after override.
pub const BACKOFF_SECONDS: &str = "tollgate_backoff_seconds";

/// Current refill rate of the token bucket, in tokens per second.
pub const CURRENT_RATE: &str = "tollgate_current_rate";

/// Total rate adjustments made by the adaptive controller.
///
/// Labels: `direction` ("up" | "down").
pub const RATE_ADJUSTMENTS_TOTAL: &str = "tollgate_rate_adjustments_total";

/// Total cache hits.
///
/// Labels: `tier`.
pub const CACHE_HITS_TOTAL: &str = "tollgate_cache_hits_total";

/// Total cache misses.
pub const CACHE_MISSES_TOTAL: &str = "tollgate_cache_misses_total";

/// Total LRU evictions from the memory tier.
pub const CACHE_EVICTIONS_TOTAL: &str = "tollgate_cache_evictions_total";

/// Total entries dropped because their TTL lapsed.
///
/// Labels: `tier`.
pub const CACHE_EXPIRED_TOTAL: &str = "tollgate_cache_expired_total";

/// Total disk entries deleted because they failed to deserialize.
pub const CACHE_CORRUPT_TOTAL: &str = "tollgate_cache_corrupt_total";
