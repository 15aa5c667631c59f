pub mod classify;
pub mod config;
pub mod config_loader;
pub mod odds;
pub mod types;

pub use classify::{Tier, TierThresholds};
pub use config::AppConfig;
pub use config_loader::ConfigLoader;
pub use types::{
    CycleOutcome, Opportunity, OpportunityKey, RawQuote, RefreshRun, Snapshot, SourceId,
};
