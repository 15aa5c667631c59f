//! Change broadcasting.
//!
//! Diffs consecutive snapshots and pushes deltas to subscribers over a
//! tokio broadcast channel. Delivery is best-effort: lagging or closed
//! receivers are the subscriber's problem, never the refresh cycle's.

use oddsight_core::config::BroadcastConfig;
use oddsight_core::{Opportunity, OpportunityKey, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

// =============================================================================
// Deltas
// =============================================================================

/// One change between consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpportunityDelta {
    /// A key not present in the previous snapshot.
    Added {
        /// The new opportunity.
        opportunity: Opportunity,
    },
    /// A key that expired out of the new snapshot.
    Removed {
        /// Identity of the removed opportunity.
        key: OpportunityKey,
    },
    /// A key whose tier changed or whose EV moved beyond the noise
    /// threshold.
    Updated {
        /// The re-priced opportunity.
        opportunity: Opportunity,
    },
}

/// Computes the meaningful changes from `previous` to `next`.
///
/// EV movement at or below `noise_threshold` with an unchanged tier is
/// float jitter and is not reported.
#[must_use]
pub fn diff(previous: &Snapshot, next: &Snapshot, noise_threshold: f64) -> Vec<OpportunityDelta> {
    let mut deltas = Vec::new();

    for (key, opportunity) in &next.opportunities {
        match previous.get(key) {
            None => deltas.push(OpportunityDelta::Added {
                opportunity: opportunity.clone(),
            }),
            Some(old) => {
                let tier_changed = old.tier != opportunity.tier;
                let ev_moved = (old.ev_percent - opportunity.ev_percent).abs() > noise_threshold;
                if tier_changed || ev_moved {
                    deltas.push(OpportunityDelta::Updated {
                        opportunity: opportunity.clone(),
                    });
                }
            }
        }
    }

    for key in previous.opportunities.keys() {
        if !next.opportunities.contains_key(key) {
            deltas.push(OpportunityDelta::Removed { key: key.clone() });
        }
    }

    deltas
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Publishes snapshot deltas to subscribed channels.
#[derive(Debug)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<OpportunityDelta>,
    noise_threshold: f64,
}

impl ChangeBroadcaster {
    /// Creates a broadcaster from configuration.
    #[must_use]
    pub fn new(config: &BroadcastConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            tx,
            noise_threshold: config.ev_noise_threshold,
        }
    }

    /// Opens a new delta subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OpportunityDelta> {
        self.tx.subscribe()
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Diffs the snapshots and publishes the deltas.
    ///
    /// Fire-and-forget: send failures mean nobody is listening and are
    /// ignored. Returns the number of deltas computed.
    pub fn publish(&self, previous: &Snapshot, next: &Snapshot) -> usize {
        let deltas = diff(previous, next, self.noise_threshold);
        let count = deltas.len();

        for delta in deltas {
            // Err here only means there are currently no receivers.
            let _ = self.tx.send(delta);
        }

        trace!(
            count,
            subscribers = self.subscriber_count(),
            "published snapshot deltas"
        );
        count
    }
}
