use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use oddsight_core::Snapshot;
use oddsight_engine::OpportunityDelta;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::handlers::OpportunityView;
use crate::server::AppState;

/// A frame sent to delta-stream subscribers.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WsFrame {
    /// Full state, sent on connect and after the client falls behind.
    Snapshot {
        version: u64,
        opportunities: Vec<OpportunityView>,
    },
    /// One incremental change.
    Delta(OpportunityDelta),
}

impl WsFrame {
    fn snapshot(snapshot: &Snapshot) -> Self {
        Self::Snapshot {
            version: snapshot.version,
            opportunities: snapshot
                .opportunities
                .values()
                .map(OpportunityView::from)
                .collect(),
        }
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| websocket_connection(socket, state))
}

async fn websocket_connection(mut socket: WebSocket, state: Arc<AppState>) {
    let mut deltas = state.broadcaster.subscribe();

    // Full snapshot first so the client starts from a consistent base.
    let initial = WsFrame::snapshot(&state.cache.current());
    if send_frame(&mut socket, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            delta = deltas.recv() => match delta {
                Ok(delta) => {
                    if send_frame(&mut socket, &WsFrame::Delta(delta)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Client fell behind the channel; resync with full state.
                    tracing::debug!(skipped, "delta subscriber lagged, resyncing");
                    let frame = WsFrame::snapshot(&state.cache.current());
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::info!("WebSocket connection closed");
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    socket.send(Message::Text(json)).await
}
