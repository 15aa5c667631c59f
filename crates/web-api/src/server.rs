use crate::{handlers, websocket};
use axum::{
    routing::{get, post},
    Router,
};
use oddsight_core::config::RefreshConfig;
use oddsight_engine::{ChangeBroadcaster, OpportunityCache, SchedulerHandle};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state behind every handler.
pub struct AppState {
    pub cache: Arc<OpportunityCache>,
    pub broadcaster: Arc<ChangeBroadcaster>,
    pub scheduler: SchedulerHandle,
    /// Snapshot age beyond which responses are flagged stale.
    pub stale_after: Duration,
}

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    #[must_use]
    pub fn new(
        cache: Arc<OpportunityCache>,
        broadcaster: Arc<ChangeBroadcaster>,
        scheduler: SchedulerHandle,
        refresh: &RefreshConfig,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                cache,
                broadcaster,
                scheduler,
                stale_after: Duration::from_secs(refresh.stale_after_secs),
            }),
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/opportunities", get(handlers::list_opportunities))
            .route(
                "/api/opportunities/:event_id/:market_key/:selection_key",
                get(handlers::get_opportunity),
            )
            .route("/api/refresh", post(handlers::trigger_refresh))
            .route("/api/health", get(handlers::health))
            .route("/ws", get(websocket::websocket_handler))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve
    /// requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
