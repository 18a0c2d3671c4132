//! Caching subsystem.
//!
//! [`TieredCache`] deduplicates identical requests within a process and
//! across restarts:
//!
//! - memory tier: bounded LRU holding the hot copy of each entry
//! - disk tier: one file per key in a directory, written atomically
//!   (temp file + rename), optional
//!
//! Both tiers are keyed by [`CacheKey`], the SHA-256 of a request's
//! canonicalised parameters (see [`KeyBuilder`]), and both honour the TTL
//! stored with each entry.

mod disk;
mod entry;
pub mod key;
mod memory;
mod tiered;

pub use key::{CacheKey, KeyBuilder};
pub use tiered::{CacheStats, CleanupReport, TieredCache};

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration_secs;
use crate::{Result, TollgateError};

/// Configuration for the tiered cache.
///
/// ```rust
/// # use tollgate::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_memory_entries(500)
///     .ttl(Duration::from_secs(600))
///     .disk_dir("/tmp/tollgate-cache");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum entries in the memory tier. Default: 1,000.
    pub max_memory_entries: usize,
    /// Default time-to-live for new entries. Default: 1 hour.
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
    /// Directory for the disk tier. `None` disables it. Default: `None`.
    pub disk_dir: Option<PathBuf>,
    /// Mixed into every key, so gates for different APIs can share a
    /// directory without colliding. Default: `None`.
    pub namespace: Option<String>,
    /// Fail a request when its response cannot be written to the disk tier.
    /// With `false` the failure is logged and the response still returned.
    /// Default: `false`.
    pub require_durable: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_entries: 1_000,
            ttl: Duration::from_secs(3600),
            disk_dir: None,
            namespace: None,
            require_durable: false,
        }
    }
}

impl CacheConfig {
    /// Create a new config with defaults (memory tier only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory tier capacity.
    pub fn max_memory_entries(mut self, n: usize) -> Self {
        self.max_memory_entries = n;
        self
    }

    /// Set the default time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable the disk tier in `dir`.
    pub fn disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    /// Set the key namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Make disk persistence part of a request's success.
    pub fn require_durable(mut self, required: bool) -> Self {
        self.require_durable = required;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_memory_entries == 0 {
            return Err(TollgateError::Configuration(
                "max_memory_entries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Platform cache directory for tollgate (e.g. `~/.cache/tollgate` on Linux).
pub fn default_disk_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("tollgate"))
}
