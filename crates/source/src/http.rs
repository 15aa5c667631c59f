//! HTTP odds provider client with rate limiting.
//!
//! Fetches JSON quote batches from a provider endpoint, authenticated by
//! API key, throttled with the governor crate, and mapped into domain
//! quotes. One client instance per configured source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use oddsight_core::config::SourceConfig;
use oddsight_core::RawQuote;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::client::{QuoteBatch, QuoteSource};
use crate::error::{Result, SourceError};

/// Header used to authenticate against the provider.
const API_KEY_HEADER: &str = "x-api-key";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for an HTTP quote source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Stable source identifier.
    pub source_id: String,

    /// Base URL of the provider (quotes are fetched from `{base_url}/quotes`).
    pub base_url: String,

    /// API key sent on each request, if required.
    pub api_key: Option<String>,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpSourceConfig {
    /// Creates a configuration with default throttling.
    #[must_use]
    pub fn new(source_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            base_url: base_url.into(),
            api_key: None,
            requests_per_minute: nonzero!(60u32),
            timeout_secs: 10,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl From<&SourceConfig> for HttpSourceConfig {
    fn from(config: &SourceConfig) -> Self {
        let mut http = Self::new(config.id.clone(), config.base_url.clone());
        if let Some(ref key) = config.api_key {
            http = http.with_api_key(key.clone());
        }
        if let Some(rpm) = NonZeroU32::new(config.requests_per_minute) {
            http = http.with_rate_limit(rpm);
        }
        http
    }
}

// =============================================================================
// API Response Types
// =============================================================================

/// Raw batch response from a provider.
#[derive(Debug, Clone, Deserialize)]
struct RawBatchResponse {
    quotes: Option<Vec<RawQuoteDto>>,
    cursor: Option<String>,
}

/// Raw quote data from the provider API.
#[derive(Debug, Clone, Deserialize)]
struct RawQuoteDto {
    event_id: String,
    market: String,
    selection: String,
    price: i32,
    observed_at: Option<String>,
}

impl RawQuoteDto {
    fn into_domain(self, source_id: &str, fallback: DateTime<Utc>) -> RawQuote {
        let observed_at = self
            .observed_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or(fallback, |d| d.with_timezone(&Utc));

        RawQuote::new(
            source_id,
            self.event_id,
            self.market,
            self.selection,
            self.price,
            observed_at,
        )
    }
}

// =============================================================================
// HTTP Quote Source
// =============================================================================

/// Rate-limited HTTP client for one odds provider.
pub struct HttpQuoteSource {
    config: HttpSourceConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    /// High-water mark enforcing monotone `observed_at` per source.
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl HttpQuoteSource {
    /// Creates a new HTTP quote source.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: HttpSourceConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            watermark: Mutex::new(None),
        })
    }

    /// Waits for the rate limiter and fetches one batch.
    async fn get_batch(&self, cursor: Option<&str>) -> Result<RawBatchResponse> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/quotes", self.config.base_url);
        let mut request = self.http.get(&url);
        if let Some(ref key) = self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        tracing::debug!(source = %self.config.source_id, %url, ?cursor, "GET quotes");

        let response = request.send().await?;
        let status = response.status();

        match status {
            StatusCode::OK => Ok(response.json::<RawBatchResponse>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Unauthorized(
                format!("provider returned {status}"),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(SourceError::rate_limited(retry_after_secs))
            }
            s if s.is_server_error() => {
                Err(SourceError::Unreachable(format!("provider returned {s}")))
            }
            s => Err(SourceError::MalformedResponse(format!(
                "unexpected status {s}"
            ))),
        }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<QuoteBatch> {
        let raw = self.get_batch(cursor).await?;
        let fetched_at = Utc::now();

        let mut quotes: Vec<RawQuote> = raw
            .quotes
            .unwrap_or_default()
            .into_iter()
            .filter(|dto| oddsight_core::odds::is_valid_american(dto.price))
            .map(|dto| dto.into_domain(&self.config.source_id, fetched_at))
            .collect();

        // Enforce monotone observed_at across successful calls: anything
        // older than the last successful batch's high-water mark is a
        // provider replay and gets dropped.
        let mut watermark = self.watermark.lock();
        if let Some(mark) = *watermark {
            let before = quotes.len();
            quotes.retain(|q| q.observed_at >= mark);
            let dropped = before - quotes.len();
            if dropped > 0 {
                tracing::debug!(
                    source = %self.config.source_id,
                    dropped,
                    "dropped quotes older than watermark"
                );
            }
        }
        if let Some(max) = quotes.iter().map(|q| q.observed_at).max() {
            *watermark = Some(max);
        }
        drop(watermark);

        tracing::debug!(
            source = %self.config.source_id,
            count = quotes.len(),
            next_cursor = ?raw.cursor,
            "fetched quote batch"
        );

        let mut batch = QuoteBatch::new(quotes);
        if let Some(cursor) = raw.cursor {
            batch = batch.with_cursor(cursor);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> HttpQuoteSource {
        let config = HttpSourceConfig::new("draftkings", server.uri())
            .with_api_key("test-key")
            .with_rate_limit(nonzero!(600u32));
        HttpQuoteSource::new(config).unwrap()
    }

    fn quote_body(observed_at: &str) -> serde_json::Value {
        serde_json::json!({
            "quotes": [
                {
                    "event_id": "nba-2026-02-01-LAL-BOS",
                    "market": "moneyline",
                    "selection": "home",
                    "price": -110,
                    "observed_at": observed_at
                },
                {
                    "event_id": "nba-2026-02-01-LAL-BOS",
                    "market": "moneyline",
                    "selection": "away",
                    "price": 120,
                    "observed_at": observed_at
                }
            ],
            "cursor": "next-1"
        })
    }

    // ==================== Fetch Tests ====================

    #[tokio::test]
    async fn test_fetch_maps_quotes_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .and(header("x-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(quote_body("2026-02-01T18:00:00Z")),
            )
            .mount(&server)
            .await;

        let source = source_for(&server);
        let batch = source.fetch(None).await.unwrap();

        assert_eq!(batch.quotes.len(), 2);
        assert_eq!(batch.next_cursor.as_deref(), Some("next-1"));
        assert_eq!(batch.quotes[0].source_id, "draftkings");
        assert_eq!(batch.quotes[0].price_american, -110);
    }

    #[tokio::test]
    async fn test_fetch_passes_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .and(query_param("cursor", "abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "quotes": [], "cursor": null })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = source_for(&server);
        let batch = source.fetch(Some("abc")).await.unwrap();

        assert!(batch.is_empty());
        assert!(batch.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_fetch_filters_invalid_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quotes": [
                    { "event_id": "e", "market": "m", "selection": "s", "price": 42 },
                    { "event_id": "e", "market": "m", "selection": "s2", "price": 150 }
                ]
            })))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let batch = source.fetch(None).await.unwrap();

        assert_eq!(batch.quotes.len(), 1);
        assert_eq!(batch.quotes[0].price_american, 150);
    }

    #[tokio::test]
    async fn test_fetch_enforces_monotone_observed_at() {
        let server = MockServer::start().await;
        let mock = Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(quote_body("2026-02-01T18:00:00Z")),
            )
            .up_to_n_times(1)
            .mount_as_scoped(&server)
            .await;

        let source = source_for(&server);
        let first = source.fetch(None).await.unwrap();
        assert_eq!(first.quotes.len(), 2);
        drop(mock);

        // Second call replays older quotes; they must be dropped.
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(quote_body("2026-02-01T17:00:00Z")),
            )
            .mount(&server)
            .await;

        let second = source.fetch(None).await.unwrap();
        assert!(second.is_empty());
    }

    // ==================== Error Mapping Tests ====================

    #[tokio::test]
    async fn test_fetch_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source.fetch(None).await.unwrap_err();

        assert!(matches!(err, SourceError::Unauthorized(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source.fetch(None).await.unwrap_err();

        assert!(matches!(
            err,
            SourceError::RateLimited {
                retry_after_secs: 17
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source.fetch(None).await.unwrap_err();

        assert!(matches!(err, SourceError::Unreachable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source.fetch(None).await.unwrap_err();

        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }
}
