//! Scripted quote sources for tests.
//!
//! `StaticQuoteSource` plays back a queue of batches and failures behind
//! the same trait the HTTP client implements, so engine tests can exercise
//! retry, partial-cycle, and expiry behavior without a network.

use async_trait::async_trait;
use oddsight_core::RawQuote;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::client::{QuoteBatch, QuoteSource};
use crate::error::{Result, SourceError};

/// A quote source that returns pre-scripted responses in order.
///
/// Once the script is exhausted, further fetches return empty batches.
pub struct StaticQuoteSource {
    source_id: String,
    script: Mutex<VecDeque<Result<QuoteBatch>>>,
    fetch_count: Mutex<u32>,
}

impl StaticQuoteSource {
    /// Creates a source with an empty script.
    #[must_use]
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            script: Mutex::new(VecDeque::new()),
            fetch_count: Mutex::new(0),
        }
    }

    /// Queues a successful batch.
    #[must_use]
    pub fn with_batch(self, quotes: Vec<RawQuote>) -> Self {
        self.script
            .lock()
            .push_back(Ok(QuoteBatch::new(quotes)));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_error(self, error: SourceError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Returns how many times `fetch` was called.
    #[must_use]
    pub fn fetch_count(&self) -> u32 {
        *self.fetch_count.lock()
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self, _cursor: Option<&str>) -> Result<QuoteBatch> {
        *self.fetch_count.lock() += 1;
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(QuoteBatch::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_static_source_plays_script_in_order() {
        let q = RawQuote::new("dk", "evt", "moneyline", "home", -110, Utc::now());
        let source = StaticQuoteSource::new("dk")
            .with_batch(vec![q])
            .with_error(SourceError::Timeout("scripted".to_string()));

        let first = source.fetch(None).await.unwrap();
        assert_eq!(first.quotes.len(), 1);

        let second = source.fetch(None).await.unwrap_err();
        assert!(matches!(second, SourceError::Timeout(_)));

        // Exhausted script returns empty batches.
        let third = source.fetch(None).await.unwrap();
        assert!(third.is_empty());

        assert_eq!(source.fetch_count(), 3);
    }
}
