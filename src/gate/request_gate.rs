//! The orchestrator every outbound call passes through.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, KeyBuilder, TieredCache};
use crate::limiter::{AdaptiveController, Outcome};
use crate::telemetry;
use crate::transport::{Transport, TransportResponse, error_message};
use crate::types::{GateResponse, Payload, RequestParams};
use crate::{Result, TollgateError};

/// Cache lookup, pacing, retry on quota violations, and cache fill around a
/// [`Transport`].
///
/// Per call:
///
/// 1. look the request up in the cache; a hit returns without touching the
///    limiter
/// 2. take a token (waiting if needed)
/// 3. send, and classify the response: 2xx succeeds, 429 backs off and goes
///    back to 2, anything else is returned as an error at once
/// 4. store a successful payload and return it
///
/// A gate is cheap to share: wrap it in an `Arc` and call it from as many
/// tasks as you like. Build one with [`Tollgate::builder()`](crate::Tollgate::builder).
pub struct RequestGate {
    transport: Arc<dyn Transport>,
    controller: Arc<AdaptiveController>,
    cache: Option<Arc<TieredCache>>,
    keys: KeyBuilder,
}

impl RequestGate {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        controller: Arc<AdaptiveController>,
        cache: Option<Arc<TieredCache>>,
        keys: KeyBuilder,
    ) -> Self {
        Self {
            transport,
            controller,
            cache,
            keys,
        }
    }

    /// Return the result for `params`, from the cache if possible.
    ///
    /// `ttl` overrides the cache's default for the stored entry.
    pub async fn execute(
        &self,
        params: &RequestParams,
        ttl: Option<Duration>,
    ) -> Result<GateResponse> {
        self.run(params, ttl, None, true).await
    }

    /// Like [`execute`](Self::execute), but fail with
    /// [`TollgateError::Timeout`] rather than wait for a token, sleep through
    /// a backoff, or keep a request in flight past `deadline`.
    pub async fn execute_until(
        &self,
        params: &RequestParams,
        ttl: Option<Duration>,
        deadline: Instant,
    ) -> Result<GateResponse> {
        self.run(params, ttl, Some(deadline), true).await
    }

    /// Skip the cache lookup and always go to the network. The fresh result
    /// still replaces whatever was cached.
    pub async fn execute_fresh(
        &self,
        params: &RequestParams,
        ttl: Option<Duration>,
    ) -> Result<GateResponse> {
        self.run(params, ttl, None, false).await
    }

    /// Drop any cached result for `params`.
    pub async fn invalidate(&self, params: &RequestParams) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.invalidate(&self.keys.build(params)).await,
            None => Ok(()),
        }
    }

    /// Cache key this gate uses for `params`.
    pub fn key_for(&self, params: &RequestParams) -> CacheKey {
        self.keys.build(params)
    }

    pub fn controller(&self) -> &Arc<AdaptiveController> {
        &self.controller
    }

    /// `None` when the gate was built without a cache.
    pub fn cache(&self) -> Option<&Arc<TieredCache>> {
        self.cache.as_ref()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    #[instrument(skip_all, fields(transport = self.transport.name()))]
    async fn run(
        &self,
        params: &RequestParams,
        ttl: Option<Duration>,
        deadline: Option<Instant>,
        use_cache: bool,
    ) -> Result<GateResponse> {
        let cached = self.cache.as_ref().map(|cache| (cache, self.keys.build(params)));

        if use_cache {
            if let Some((cache, key)) = &cached {
                if let Some(payload) = cache.get(key).await {
                    debug!(key = key.short(), "served from cache");
                    return Ok(GateResponse {
                        payload,
                        cached: true,
                    });
                }
            }
        }

        let payload = self.fetch(params, deadline).await?;

        if let Some((cache, key)) = &cached {
            let ttl = ttl.unwrap_or_else(|| cache.default_ttl());
            if let Err(e) = cache.put(key, payload.clone(), ttl).await {
                if cache.require_durable() {
                    return Err(e);
                }
                warn!(key = key.short(), error = %e, "failed to persist response to cache");
            }
        }

        Ok(GateResponse {
            payload,
            cached: false,
        })
    }

    /// Acquire, send and classify, retrying quota violations up to the
    /// backoff budget.
    async fn fetch(&self, params: &RequestParams, deadline: Option<Instant>) -> Result<Payload> {
        let attempts = self.controller.backoff().max_retries.saturating_add(1);
        let transport = self.transport.name().to_owned();

        for attempt in 0..attempts {
            if attempt > 0 {
                metrics::counter!(telemetry::RETRIES_TOTAL, "transport" => transport.clone())
                    .increment(1);
            }

            self.controller.acquire(deadline).await?;
            let response = match self.send(params, deadline, &transport).await {
                Ok(response) => response,
                Err(e) => {
                    self.controller.report_outcome(Outcome::OtherFailure);
                    record_request(&transport, "error");
                    return Err(e);
                }
            };

            if response.is_success() {
                self.controller.report_outcome(Outcome::Success);
                record_request(&transport, "ok");
                return Ok(response.into_payload());
            }

            if !response.is_quota_violation() {
                self.controller.report_outcome(Outcome::OtherFailure);
                record_request(&transport, "error");
                return Err(TollgateError::Api {
                    status: response.status,
                    message: error_message(&response.body),
                });
            }

            let retry_after = response.retry_after;
            self.controller
                .report_outcome(Outcome::QuotaViolation { retry_after });
            record_request(&transport, "quota");

            if attempt + 1 == attempts {
                break;
            }

            let delay = self.controller.backoff_delay(attempt, retry_after);
            let past_deadline = deadline.is_some_and(|deadline| {
                Instant::now()
                    .checked_add(delay)
                    .is_none_or(|wake| wake > deadline)
            });
            if past_deadline {
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "backoff would pass the deadline"
                );
                return Err(TollgateError::Timeout);
            }

            warn!(
                attempt = attempt + 1,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "quota violation, backing off"
            );
            metrics::histogram!(telemetry::BACKOFF_SECONDS).record(delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }

        warn!(attempts, "retry budget exhausted on quota violations");
        Err(TollgateError::QuotaExceeded { attempts })
    }

    async fn send(
        &self,
        params: &RequestParams,
        deadline: Option<Instant>,
        transport: &str,
    ) -> Result<TransportResponse> {
        let start = Instant::now();
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.transport.send(params))
                .await
                .unwrap_or(Err(TollgateError::Timeout)),
            None => self.transport.send(params).await,
        };
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "transport" => transport.to_owned())
            .record(start.elapsed().as_secs_f64());
        result
    }
}

fn record_request(transport: &str, status: &'static str) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "transport" => transport.to_owned(),
        "status" => status,
    )
    .increment(1);
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("transport", &self.transport.name())
            .field("current_rate", &self.controller.current_rate())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
