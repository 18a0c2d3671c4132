//! Builder for configuring gate instances

use std::sync::Arc;

use tracing::info;

use super::RequestGate;
use crate::cache::{CacheConfig, KeyBuilder, TieredCache};
use crate::config::Config;
use crate::limiter::{AdaptiveController, BackoffConfig, RateLimitConfig};
use crate::transport::{HttpConfig, HttpTransport, Transport};
use crate::{Result, TollgateError};

/// Main entry point for creating gate instances.
pub struct Tollgate;

impl Tollgate {
    /// Create a new builder for configuring a gate.
    ///
    /// ```rust,no_run
    /// # use tollgate::{CacheConfig, HttpConfig, RateLimitConfig, Tollgate};
    /// # fn main() -> tollgate::Result<()> {
    /// let gate = Tollgate::builder()
    ///     .http(HttpConfig::new("https://api.example.com/search"))
    ///     .rate_limit(RateLimitConfig::new().tokens_per_second(0.5).burst_capacity(3))
    ///     .cache(CacheConfig::new().disk_dir("/tmp/tollgate"))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> GateBuilder {
        GateBuilder::new()
    }
}

/// Builder for configuring gate instances.
///
/// A transport is required, either given directly or built from an
/// [`HttpConfig`]. Everything else has defaults: the default limiter and
/// backoff settings, and a memory-only cache.
pub struct GateBuilder {
    transport: Option<Arc<dyn Transport>>,
    http: Option<HttpConfig>,
    rate_limit: RateLimitConfig,
    backoff: BackoffConfig,
    cache: Option<CacheConfig>,
    controller: Option<Arc<AdaptiveController>>,
    shared_cache: Option<Arc<TieredCache>>,
}

impl GateBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            http: None,
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
            cache: Some(CacheConfig::default()),
            controller: None,
            shared_cache: None,
        }
    }

    /// Take every section from a loaded [`Config`].
    pub fn from_config(config: Config) -> Self {
        Self::new()
            .rate_limit(config.limiter)
            .backoff(config.backoff)
            .cache(config.cache)
            .http(config.http)
    }

    /// Use a custom transport. Takes precedence over [`http`](Self::http).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Send requests with an [`HttpTransport`] built from `config`.
    pub fn http(mut self, config: HttpConfig) -> Self {
        self.http = Some(config);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Build the gate without a cache; every call goes to the network.
    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self.shared_cache = None;
        self
    }

    /// Share an existing controller, so several gates draw from one quota.
    /// Overrides the rate limit and backoff settings.
    pub fn controller(mut self, controller: Arc<AdaptiveController>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Share an existing cache. The key namespace is still taken from the
    /// builder's cache config.
    pub fn shared_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Build the gate.
    pub fn build(self) -> Result<RequestGate> {
        let transport: Arc<dyn Transport> = match (self.transport, &self.http) {
            (Some(transport), _) => transport,
            (None, Some(http)) => Arc::new(HttpTransport::new(http)?),
            (None, None) => {
                return Err(TollgateError::Configuration(
                    "no transport configured: set one or provide an HTTP config".into(),
                ));
            }
        };

        let controller = match self.controller {
            Some(controller) => controller,
            None => Arc::new(AdaptiveController::new(self.rate_limit, self.backoff)?),
        };

        let namespace = self.cache.as_ref().and_then(|c| c.namespace.clone());
        let cache = match (self.shared_cache, &self.cache) {
            (Some(cache), _) => Some(cache),
            (None, Some(config)) => Some(Arc::new(TieredCache::new(config)?)),
            (None, None) => None,
        };
        let keys = match namespace {
            Some(ns) => KeyBuilder::with_namespace(ns),
            None => KeyBuilder::new(),
        };

        info!(
            transport = transport.name(),
            cache = cache.is_some(),
            disk = cache.as_ref().is_some_and(|c| c.disk_dir().is_some()),
            "built request gate"
        );
        Ok(RequestGate::new(transport, controller, cache, keys))
    }
}

impl Default for GateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
