//! The seam through which the gate performs the actual network call.
//!
//! The gate never looks inside a response beyond its status code and
//! `Retry-After` hint; everything else is carried through as an opaque
//! [`Payload`](crate::Payload). Implement [`Transport`] to put the gate in
//! front of something other than plain HTTP GET (or to mock it in tests).

mod http;

pub use http::{HttpConfig, HttpTransport};

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::types::{Payload, RequestParams};

/// Longest error message extracted from a response body.
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Raw outcome of one network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Parsed `Retry-After` header, if present and well-formed.
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// A response with no content type and no retry hint.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// HTTP 429.
    pub fn is_quota_violation(&self) -> bool {
        self.status == 429
    }

    /// Consume into the payload that gets cached and returned.
    pub fn into_payload(self) -> Payload {
        Payload {
            status: self.status,
            content_type: self.content_type,
            body: self.body,
        }
    }
}

/// Performs one request for a parameter set.
///
/// Non-2xx statuses are returned as `Ok` responses; the gate classifies
/// them. `Err` is reserved for failures that produced no response at all
/// (connection refused, timeout, malformed URL).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging and metric labels.
    fn name(&self) -> &str;

    async fn send(&self, params: &RequestParams) -> Result<TransportResponse>;
}

/// Pull a short human-readable message out of an error body.
///
/// JSON bodies are searched for the usual top-level keys (`message`,
/// `detail`, `error`, `errors`, `title`); nested `{"error": {"message": ..}}`
/// shapes are followed one level. Anything else falls back to the first
/// 200 characters of the body text.
pub fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = json_message(&value) {
            return truncate(&message);
        }
    }
    let text = String::from_utf8_lossy(body);
    truncate(text.trim())
}

fn json_message(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    let object = value.as_object()?;
    for field in ["message", "detail", "error", "errors", "title"] {
        match object.get(field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(nested @ Value::Object(_)) => {
                if let Some(message) = nested.get("message").and_then(Value::as_str) {
                    return Some(message.to_string());
                }
            }
            Some(Value::Array(items)) if !items.is_empty() => {
                return Some(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join("; "),
                );
            }
            _ => {}
        }
    }
    None
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
