//! Shared types for the odds aggregation pipeline.
//!
//! This module defines the core data structures used across the engine
//! for ingesting book quotes, consolidating them into opportunities, and
//! tracking refresh cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::Tier;

/// Identifier of a configured sportsbook / odds source.
pub type SourceId = String;

// =============================================================================
// Raw Quote
// =============================================================================

/// One book's price for one selection at one instant.
///
/// Produced only by quote sources; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuote {
    /// Source (sportsbook) that reported this price.
    pub source_id: SourceId,

    /// Event identifier (e.g., "nba-2026-02-01-LAL-BOS").
    pub event_id: String,

    /// Market within the event (e.g., "moneyline", "spread-4.5").
    pub market_key: String,

    /// Selection within the market (e.g., "home", "away", "over").
    pub selection_key: String,

    /// Quoted price in American odds convention (+150, -110, ...).
    pub price_american: i32,

    /// When the source observed this price.
    pub observed_at: DateTime<Utc>,
}

impl RawQuote {
    /// Creates a new raw quote.
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        event_id: impl Into<String>,
        market_key: impl Into<String>,
        selection_key: impl Into<String>,
        price_american: i32,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            event_id: event_id.into(),
            market_key: market_key.into(),
            selection_key: selection_key.into(),
            price_american,
            observed_at,
        }
    }

    /// Returns the opportunity key this quote belongs to.
    #[must_use]
    pub fn key(&self) -> OpportunityKey {
        OpportunityKey {
            event_id: self.event_id.clone(),
            market_key: self.market_key.clone(),
            selection_key: self.selection_key.clone(),
        }
    }
}

// =============================================================================
// Opportunity Key
// =============================================================================

/// Stable identity of one (event, market, selection) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpportunityKey {
    /// Event identifier.
    pub event_id: String,
    /// Market within the event.
    pub market_key: String,
    /// Selection within the market.
    pub selection_key: String,
}

impl OpportunityKey {
    /// Creates a new opportunity key.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        market_key: impl Into<String>,
        selection_key: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            market_key: market_key.into(),
            selection_key: selection_key.into(),
        }
    }

    /// Returns the key of the market this selection belongs to.
    #[must_use]
    pub fn market(&self) -> (String, String) {
        (self.event_id.clone(), self.market_key.clone())
    }
}

impl std::fmt::Display for OpportunityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.event_id, self.market_key, self.selection_key
        )
    }
}

// =============================================================================
// Opportunity
// =============================================================================

/// The consolidated, fair-valued view of one (event, market, selection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Identity of this opportunity.
    pub key: OpportunityKey,

    /// One entry per book still offering this selection.
    pub book_quotes: BTreeMap<SourceId, RawQuote>,

    /// Consensus probability derived from `book_quotes`, in (0, 1).
    pub fair_probability: f64,

    /// The quote with the highest EV among `book_quotes`.
    pub best_quote: RawQuote,

    /// EV of `best_quote` relative to `fair_probability`, as a percentage.
    /// Negative values are valid and indicate no edge.
    pub ev_percent: f64,

    /// Discrete tier derived from `ev_percent`.
    pub tier: Tier,

    /// Set when the fair price could not be devigged confidently
    /// (e.g., a single book with no complementary outcome).
    pub low_confidence: bool,

    /// Monotonic per-key version, bumped each cycle the key appears.
    pub version: u64,

    /// When this opportunity was last priced.
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Returns the EV rounded to one decimal place for boundary reporting.
    ///
    /// Full precision is carried internally to avoid classification
    /// flapping from rounding.
    #[must_use]
    pub fn ev_percent_rounded(&self) -> f64 {
        (self.ev_percent * 10.0).round() / 10.0
    }

    /// Returns true if the best quote carries a positive edge.
    #[must_use]
    pub fn is_positive_ev(&self) -> bool {
        self.ev_percent > 0.0
    }

    /// Returns the number of books currently quoting this selection.
    #[must_use]
    pub fn book_count(&self) -> usize {
        self.book_quotes.len()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable, versioned collection of all current opportunities.
///
/// Owned exclusively by the cache; replaced whole, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic snapshot version.
    pub version: u64,

    /// All current opportunities, keyed by identity.
    pub opportunities: BTreeMap<OpportunityKey, Opportunity>,

    /// Time of the last successful swap that produced this snapshot.
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Creates an empty snapshot at version zero.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            opportunities: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Creates a snapshot from priced opportunities.
    #[must_use]
    pub fn new(
        version: u64,
        opportunities: BTreeMap<OpportunityKey, Opportunity>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            opportunities,
            updated_at,
        }
    }

    /// Looks up one opportunity by key.
    #[must_use]
    pub fn get(&self, key: &OpportunityKey) -> Option<&Opportunity> {
        self.opportunities.get(key)
    }

    /// Returns the number of opportunities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    /// Returns true if the snapshot holds no opportunities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }

    /// Returns the age of this snapshot relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Refresh Run
// =============================================================================

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// All attempted sources succeeded.
    Success,
    /// Some sources failed; the snapshot was still updated.
    Partial,
    /// Zero sources succeeded; the cache was left untouched.
    Failed,
    /// The cycle was cancelled before a swap could happen.
    Cancelled,
}

impl CycleOutcome {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if the cycle produced a new snapshot.
    #[must_use]
    pub fn updated_snapshot(self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one refresh attempt, used for backoff decisions and
/// observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRun {
    /// When the cycle started.
    pub started_at: DateTime<Utc>,

    /// Number of sources the cycle attempted.
    pub sources_attempted: u32,

    /// Number of sources that failed after retries.
    pub sources_failed: u32,

    /// How the cycle ended.
    pub outcome: CycleOutcome,

    /// Wall-clock duration of the cycle.
    pub duration_ms: u64,
}

impl RefreshRun {
    /// Returns the number of sources that succeeded.
    #[must_use]
    pub fn sources_succeeded(&self) -> u32 {
        self.sources_attempted.saturating_sub(self.sources_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(source: &str, selection: &str, price: i32) -> RawQuote {
        RawQuote::new(
            source,
            "nba-2026-02-01-LAL-BOS",
            "moneyline",
            selection,
            price,
            Utc::now(),
        )
    }

    // ==================== RawQuote Tests ====================

    #[test]
    fn test_raw_quote_key() {
        let q = quote("draftkings", "home", -110);
        let key = q.key();

        assert_eq!(key.event_id, "nba-2026-02-01-LAL-BOS");
        assert_eq!(key.market_key, "moneyline");
        assert_eq!(key.selection_key, "home");
    }

    #[test]
    fn test_raw_quote_serialization() {
        let q = quote("fanduel", "away", 150);
        let json = serde_json::to_string(&q).unwrap();
        let deserialized: RawQuote = serde_json::from_str(&json).unwrap();
        assert_eq!(q, deserialized);
    }

    // ==================== OpportunityKey Tests ====================

    #[test]
    fn test_opportunity_key_display() {
        let key = OpportunityKey::new("evt-1", "moneyline", "home");
        assert_eq!(key.to_string(), "evt-1/moneyline/home");
    }

    #[test]
    fn test_opportunity_key_ordering() {
        let a = OpportunityKey::new("evt-1", "moneyline", "away");
        let b = OpportunityKey::new("evt-1", "moneyline", "home");
        let c = OpportunityKey::new("evt-2", "moneyline", "away");

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_opportunity_key_market() {
        let key = OpportunityKey::new("evt-1", "spread-4.5", "home");
        assert_eq!(
            key.market(),
            ("evt-1".to_string(), "spread-4.5".to_string())
        );
    }

    // ==================== Snapshot Tests ====================

    #[test]
    fn test_snapshot_empty() {
        let snapshot = Snapshot::empty();

        assert_eq!(snapshot.version, 0);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }

    #[test]
    fn test_snapshot_age() {
        let snapshot = Snapshot::empty();
        let later = snapshot.updated_at + chrono::Duration::seconds(90);

        assert_eq!(snapshot.age(later).num_seconds(), 90);
    }

    // ==================== CycleOutcome Tests ====================

    #[test]
    fn test_cycle_outcome_updated_snapshot() {
        assert!(CycleOutcome::Success.updated_snapshot());
        assert!(CycleOutcome::Partial.updated_snapshot());
        assert!(!CycleOutcome::Failed.updated_snapshot());
        assert!(!CycleOutcome::Cancelled.updated_snapshot());
    }

    #[test]
    fn test_cycle_outcome_display() {
        assert_eq!(CycleOutcome::Success.to_string(), "success");
        assert_eq!(CycleOutcome::Partial.to_string(), "partial");
        assert_eq!(CycleOutcome::Failed.to_string(), "failed");
    }

    // ==================== RefreshRun Tests ====================

    #[test]
    fn test_refresh_run_sources_succeeded() {
        let run = RefreshRun {
            started_at: Utc::now(),
            sources_attempted: 5,
            sources_failed: 2,
            outcome: CycleOutcome::Partial,
            duration_ms: 840,
        };

        assert_eq!(run.sources_succeeded(), 3);
    }

    #[test]
    fn test_refresh_run_serialization() {
        let run = RefreshRun {
            started_at: Utc::now(),
            sources_attempted: 3,
            sources_failed: 0,
            outcome: CycleOutcome::Success,
            duration_ms: 412,
        };

        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains("\"success\""));

        let deserialized: RefreshRun = serde_json::from_str(&json).unwrap();
        assert_eq!(run, deserialized);
    }
}
