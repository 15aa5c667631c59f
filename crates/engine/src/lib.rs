//! Refresh engine: consolidation, devig pricing, snapshot cache, change
//! broadcast, and the adaptive scheduler that ties them together.

pub mod broadcast;
pub mod cache;
pub mod consolidate;
pub mod pricing;
pub mod scheduler;
pub mod sink;

pub use broadcast::{ChangeBroadcaster, OpportunityDelta};
pub use cache::OpportunityCache;
pub use consolidate::{consolidate, CandidateOpportunity};
pub use pricing::price_all;
pub use scheduler::{
    ActivityCadence, BackoffPolicy, CadencePolicy, RefreshScheduler, SchedulerHandle,
    SchedulerState,
};
pub use sink::{LoggingSink, SnapshotSink};
