//! Response payloads as stored by the cache and returned by the gate.

use serde::de::DeserializeOwned;

use crate::Result;

/// An opaque response body plus the minimal metadata needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// HTTP status code of the response that produced this payload.
    pub status: u16,
    /// `Content-Type` header, if the response carried one.
    pub content_type: Option<String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl Payload {
    /// Create a payload with status 200 and no content type.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: None,
            body: body.into(),
        }
    }

    /// Set the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Approximate memory footprint used for cache accounting.
    pub fn size_hint(&self) -> usize {
        self.body.len() + self.content_type.as_ref().map_or(0, String::len)
    }
}

/// Result of [`RequestGate::execute`](crate::RequestGate::execute).
#[derive(Debug, Clone)]
pub struct GateResponse {
    pub payload: Payload,
    /// `true` when the payload was served from the cache without a network call.
    pub cached: bool,
}
