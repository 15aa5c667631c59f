use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use oddsight_core::{Opportunity, OpportunityKey, RefreshRun, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::server::AppState;

// =============================================================================
// Views
// =============================================================================

/// One opportunity as served over the API. EV is rounded to one decimal
/// place so readings are stable across refreshes.
#[derive(Debug, Serialize)]
pub struct OpportunityView {
    pub event_id: String,
    pub market_key: String,
    pub selection_key: String,
    /// American price per book still offering this selection.
    pub books: BTreeMap<String, i32>,
    pub fair_probability: f64,
    pub best_source: String,
    pub best_price: i32,
    pub ev_percent: f64,
    pub tier: Tier,
    pub low_confidence: bool,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&Opportunity> for OpportunityView {
    fn from(opp: &Opportunity) -> Self {
        Self {
            event_id: opp.key.event_id.clone(),
            market_key: opp.key.market_key.clone(),
            selection_key: opp.key.selection_key.clone(),
            books: opp
                .book_quotes
                .iter()
                .map(|(source, quote)| (source.clone(), quote.price_american))
                .collect(),
            fair_probability: opp.fair_probability,
            best_source: opp.best_quote.source_id.clone(),
            best_price: opp.best_quote.price_american,
            ev_percent: opp.ev_percent_rounded(),
            tier: opp.tier,
            low_confidence: opp.low_confidence,
            version: opp.version,
            updated_at: opp.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OpportunitiesResponse {
    pub snapshot_version: u64,
    pub updated_at: DateTime<Utc>,
    /// True when the snapshot is older than the configured staleness bound.
    pub is_stale: bool,
    pub opportunities: Vec<OpportunityView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpportunityFilter {
    pub event: Option<String>,
    pub market: Option<String>,
    pub tier: Option<Tier>,
    pub min_ev: Option<f64>,
}

impl OpportunityFilter {
    fn matches(&self, opp: &Opportunity) -> bool {
        if let Some(event) = &self.event {
            if &opp.key.event_id != event {
                return false;
            }
        }
        if let Some(market) = &self.market {
            if &opp.key.market_key != market {
                return false;
            }
        }
        if let Some(tier) = self.tier {
            if opp.tier != tier {
                return false;
            }
        }
        if let Some(min_ev) = self.min_ev {
            if opp.ev_percent_rounded() < min_ev {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub snapshot_version: u64,
    pub opportunity_count: usize,
    pub is_stale: bool,
    pub scheduler_state: oddsight_engine::SchedulerState,
    pub last_run: Option<RefreshRun>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Lists opportunities from the current snapshot, optionally filtered by
/// event, market, tier, or a minimum EV.
pub async fn list_opportunities(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<OpportunityFilter>,
) -> Json<OpportunitiesResponse> {
    let snapshot = state.cache.current();

    let opportunities = snapshot
        .opportunities
        .values()
        .filter(|opp| filter.matches(opp))
        .map(OpportunityView::from)
        .collect();

    Json(OpportunitiesResponse {
        snapshot_version: snapshot.version,
        updated_at: snapshot.updated_at,
        is_stale: state.cache.is_stale(state.stale_after),
        opportunities,
    })
}

/// Fetches a single opportunity by its composite key.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the key is not in the current snapshot.
pub async fn get_opportunity(
    State(state): State<Arc<AppState>>,
    Path((event_id, market_key, selection_key)): Path<(String, String, String)>,
) -> Result<Json<OpportunityView>, StatusCode> {
    let key = OpportunityKey::new(event_id, market_key, selection_key);
    let snapshot = state.cache.current();

    snapshot
        .get(&key)
        .map(|opp| Json(OpportunityView::from(opp)))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Triggers a refresh cycle and waits for its outcome. Concurrent calls
/// coalesce into a single cycle.
///
/// # Errors
/// Returns `StatusCode::SERVICE_UNAVAILABLE` if the scheduler has shut down.
pub async fn trigger_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshRun>, StatusCode> {
    state
        .scheduler
        .trigger_refresh()
        .await
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// Reports service liveness plus snapshot and scheduler status.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.cache.current();

    Json(HealthResponse {
        status: "ok",
        snapshot_version: snapshot.version,
        opportunity_count: snapshot.len(),
        is_stale: state.cache.is_stale(state.stale_after),
        scheduler_state: state.scheduler.state(),
        last_run: state.scheduler.last_run(),
    })
}
