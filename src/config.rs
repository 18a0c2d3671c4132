//! Configuration file loading.
//!
//! A single TOML file configures one gate. Every section and every key is
//! optional; missing values take the defaults of the corresponding config
//! type. Durations are given in (fractional) seconds.
//!
//! ```toml
//! [limiter]
//! tokens_per_second = 0.2
//! burst_capacity = 5
//! adaptive = true
//! max_rate = 0.25
//!
//! [backoff]
//! base_backoff_secs = 5.0
//! max_backoff_secs = 60.0
//! multiplier = 2.0
//! jitter_factor = 0.1
//! max_retries = 4
//!
//! [cache]
//! max_memory_entries = 1000
//! ttl_secs = 3600
//! disk_dir = "/var/cache/tollgate"
//! require_durable = false
//!
//! [http]
//! base_url = "https://api.example.com/search"
//! timeout_secs = 30
//! api_key_header = "x-api-key"
//!
//! [http.headers]
//! "x-api-host" = "api.example.com"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::limiter::{BackoffConfig, RateLimitConfig};
use crate::transport::HttpConfig;
use crate::{Result, TollgateError};

/// Complete gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub limiter: RateLimitConfig,
    pub backoff: BackoffConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TollgateError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| TollgateError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;
        self.backoff.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Serde adapter: `Duration` as a number of (fractional) seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
