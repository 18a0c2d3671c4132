//! Tollgate error types

use std::path::PathBuf;

/// Tollgate error types
#[derive(Debug, thiserror::Error)]
pub enum TollgateError {
    // Quota errors
    /// Non-blocking acquire found too few tokens. Retryable by caller policy.
    #[error("quota unavailable: not enough tokens")]
    QuotaUnavailable,

    /// Deadline passed while waiting for tokens or during a backoff sleep.
    #[error("deadline exceeded while waiting for quota")]
    Timeout,

    /// Every attempt in the retry budget hit a quota violation.
    #[error("quota exceeded after {attempts} attempts")]
    QuotaExceeded { attempts: u32 },

    // Other failures, surfaced unchanged and never retried by the gate
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    // Cache errors
    /// A disk entry failed to deserialize. Handled inside the cache: the
    /// entry is deleted and the lookup reported as a miss.
    #[error("corrupt cache entry {}: {reason}", path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TollgateError {
    /// Whether this error belongs to the quota family (recovered internally
    /// by the gate up to its retry bound, or reported once the bound is hit).
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            Self::QuotaUnavailable | Self::Timeout | Self::QuotaExceeded { .. }
        )
    }

    /// Whether this error is a non-quota transport or HTTP failure.
    pub fn is_other_failure(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. })
    }

    /// HTTP status code, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TollgateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TollgateError::Http(format!("request timed out: {err}"))
        } else {
            TollgateError::Http(err.to_string())
        }
    }
}

/// Result type alias for Tollgate operations
pub type Result<T> = std::result::Result<T, TollgateError>;
