//! HTTP GET transport over `reqwest`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::Deserialize;
use tracing::debug;

use super::{Transport, TransportResponse};
use crate::config::duration_secs;
use crate::types::RequestParams;
use crate::{Result, TollgateError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// Configuration for [`HttpTransport`].
///
/// ```rust
/// # use tollgate::HttpConfig;
/// let config = HttpConfig::new("https://api.example.com/search")
///     .header("x-api-host", "api.example.com")
///     .api_key("secret");
/// assert_eq!(config.api_key_header, "x-api-key");
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Endpoint every request is sent to. Required to build a transport.
    pub base_url: Option<String>,
    /// Per-request timeout. Default: 30s.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Static headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// API key sent in `api_key_header`. Usually supplied from the
    /// environment rather than the config file.
    pub api_key: Option<String>,
    /// Header that carries the API key. Default: `x-api-key`.
    pub api_key_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }
}

// Keep the key out of logs.
impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a static header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn api_key_header(mut self, name: impl Into<String>) -> Self {
        self.api_key_header = name.into();
        self
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        let api_key = self
            .api_key
            .as_ref()
            .map(|key| (&self.api_key_header, key));
        for (name, value) in self.headers.iter().chain(api_key) {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TollgateError::Configuration(format!("invalid header name {name:?}: {e}"))
            })?;
            let mut value = HeaderValue::from_str(value).map_err(|e| {
                TollgateError::Configuration(format!("invalid value for header {name}: {e}"))
            })?;
            if name.as_str() == self.api_key_header.to_ascii_lowercase() {
                value.set_sensitive(true);
            }
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// Sends each parameter set as the query string of a GET to `base_url`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| TollgateError::Configuration("http.base_url is not set".into()))?;
        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(config.header_map()?)
            .build()
            .map_err(|e| TollgateError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, params: &RequestParams) -> Result<TransportResponse> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&params.to_query_pairs())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.bytes().await?.to_vec();

        debug!(status, bytes = body.len(), ?retry_after, "http response");
        Ok(TransportResponse {
            status,
            content_type,
            retry_after,
            body,
        })
    }
}

/// `Retry-After` as (possibly fractional) seconds. HTTP-date forms and
/// negative or non-finite numbers are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_accepts_fractional_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn retry_after_ignores_garbage() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("NaN"), None);
    }

    #[test]
    fn missing_base_url_is_config_error() {
        let err = HttpTransport::new(&HttpConfig::default()).unwrap_err();
        assert!(matches!(err, TollgateError::Configuration(_)));
    }

    #[test]
    fn invalid_header_is_config_error() {
        let config = HttpConfig::new("http://localhost").header("bad header", "x");
        assert!(matches!(
            HttpTransport::new(&config),
            Err(TollgateError::Configuration(_))
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = HttpConfig::new("http://localhost").api_key("hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
