//! Content-addressed cache keys.
//!
//! The canonical form of a parameter set is its `(key, value)` pairs sorted
//! by case-folded key (original spelling breaks ties), with each string
//! length-prefixed so no choice of separator can make two different sets
//! collide. The SHA-256 of that form, hex-encoded, is the key.

use std::fmt::{self, Write};

use sha2::{Digest, Sha256};

use crate::types::RequestParams;
use crate::{Result, TollgateError};

/// Length of a key in hex characters.
const KEY_LEN: usize = 64;

/// Identity of a cached response: 64 lowercase hex characters.
///
/// Only constructible through [`KeyBuilder`] or [`CacheKey::parse`], so it
/// is always safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate and wrap an existing key string.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() == KEY_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(Self(s.to_string()))
        } else {
            Err(TollgateError::InvalidInput(format!("not a cache key: {s:?}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds [`CacheKey`]s from request parameters.
///
/// ```rust
/// # use tollgate::{KeyBuilder, RequestParams};
/// let keys = KeyBuilder::new();
/// let a = RequestParams::new().with("a", 1).with("b", 2);
/// let b = RequestParams::new().with("b", 2).with("a", 1);
/// assert_eq!(keys.build(&a), keys.build(&b));
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    namespace: Option<String>,
}

impl KeyBuilder {
    /// Key builder without a namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key builder whose keys never collide with those of another namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    /// Hash the canonical form of `params`.
    pub fn build(&self, params: &RequestParams) -> CacheKey {
        let digest = Sha256::digest(self.canonical_form(params).as_bytes());
        let mut out = String::with_capacity(KEY_LEN);
        for byte in digest {
            let _ = write!(&mut out, "{byte:02x}");
        }
        CacheKey(out)
    }

    fn canonical_form(&self, params: &RequestParams) -> String {
        let mut pairs: Vec<(String, &str, String)> = params
            .iter()
            .map(|(k, v)| (k.to_lowercase(), k, v.to_string()))
            .collect();
        pairs.sort();

        let mut out = String::new();
        if let Some(ns) = &self.namespace {
            let _ = write!(&mut out, "ns{}:{ns};", ns.len());
        }
        for (folded, _, value) in &pairs {
            let _ = write!(
                &mut out,
                "{}:{folded}={}:{value};",
                folded.len(),
                value.len()
            );
        }
        out
    }
}
