//! Error types for odds provider integration.
//!
//! Provides typed failures for the quote source contract. Everything here
//! is retryable by the scheduler except `Unauthorized`, which disables the
//! source until it is reconfigured.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when fetching quotes from a provider.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Request exceeded the per-source timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Provider asked us to slow down.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Credentials rejected. Fatal for the source until reconfigured.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Response body could not be parsed into quotes.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Provider could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),
}

impl SourceError {
    /// Creates a rate limit error.
    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Returns true if the scheduler may retry this source within a cycle.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unauthorized(_))
    }

    /// Returns the delay the provider asked for, if any.
    ///
    /// The scheduler uses this instead of its own backoff when present.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Unreachable(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
