//! The quote source contract.
//!
//! A [`QuoteSource`] fetches a bounded, time-stamped batch of raw quotes
//! from one odds provider per call. Sources are stateless beyond the
//! watermark needed to keep `observed_at` monotone per source; everything
//! else (retry, backoff, scheduling) lives in the engine.

use async_trait::async_trait;
use oddsight_core::RawQuote;

use crate::error::Result;

/// A batch of quotes returned by one fetch.
#[derive(Debug, Clone, Default)]
pub struct QuoteBatch {
    /// Quotes observed since the cursor (or a full batch if the provider
    /// does not support incremental fetch).
    pub quotes: Vec<RawQuote>,

    /// Opaque, source-specific cursor to pass into the next fetch.
    pub next_cursor: Option<String>,
}

impl QuoteBatch {
    /// Creates a batch with no cursor.
    #[must_use]
    pub fn new(quotes: Vec<RawQuote>) -> Self {
        Self {
            quotes,
            next_cursor: None,
        }
    }

    /// Attaches a cursor for the next incremental fetch.
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }

    /// Returns true if the batch holds no quotes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// One configured odds provider.
///
/// Guarantee: a successful call returns quotes observed no earlier than the
/// previous successful call for the same source, or is empty.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable identifier of this source.
    fn source_id(&self) -> &str;

    /// Fetches quotes observed since `cursor`.
    ///
    /// The cursor is opaque and source-specific; sources that do not
    /// support incremental fetch ignore it and return a full batch.
    ///
    /// # Errors
    /// Returns a [`crate::SourceError`] describing the failure; all
    /// variants except `Unauthorized` are retryable.
    async fn fetch(&self, cursor: Option<&str>) -> Result<QuoteBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_quote_batch_with_cursor() {
        let batch = QuoteBatch::new(vec![]).with_cursor("cursor-7");

        assert!(batch.is_empty());
        assert_eq!(batch.next_cursor.as_deref(), Some("cursor-7"));
    }

    #[test]
    fn test_quote_batch_holds_quotes() {
        let q = RawQuote::new("dk", "evt", "moneyline", "home", -110, Utc::now());
        let batch = QuoteBatch::new(vec![q]);

        assert!(!batch.is_empty());
        assert_eq!(batch.quotes.len(), 1);
    }
}
