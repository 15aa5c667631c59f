//! Snapshot persistence seam.
//!
//! The engine hands each swapped snapshot to an optional sink for
//! durability or analytics. Writes are fire-and-forget; a sink failure
//! never blocks or fails the refresh cycle.

use async_trait::async_trait;
use oddsight_core::Snapshot;
use std::sync::Arc;

/// Receives a copy of each new snapshot.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Records one snapshot.
    ///
    /// # Errors
    /// Implementations may fail; the caller logs and drops the error.
    async fn record(&self, snapshot: Arc<Snapshot>) -> anyhow::Result<()>;
}

/// Sink that only logs snapshot summaries.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl SnapshotSink for LoggingSink {
    async fn record(&self, snapshot: Arc<Snapshot>) -> anyhow::Result<()> {
        tracing::info!(
            version = snapshot.version,
            opportunities = snapshot.len(),
            "snapshot recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_sink_accepts_snapshots() {
        let sink = LoggingSink;
        let snapshot = Arc::new(Snapshot::empty());

        assert!(sink.record(snapshot).await.is_ok());
    }
}
