pub mod run;
pub mod scan;

use anyhow::Context;
use oddsight_core::{AppConfig, ConfigLoader};
use oddsight_engine::{
    ChangeBroadcaster, LoggingSink, OpportunityCache, RefreshScheduler, SchedulerHandle,
};
use oddsight_source::{HttpQuoteSource, HttpSourceConfig, QuoteSource};
use std::sync::Arc;

/// Loads configuration, applying a profile overlay when one is given.
pub(crate) fn load_config(path: &str, profile: Option<&str>) -> anyhow::Result<AppConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load(path),
    }
}

/// Builds the engine wiring shared by `run` and `scan`.
pub(crate) struct Engine {
    pub cache: Arc<OpportunityCache>,
    pub broadcaster: Arc<ChangeBroadcaster>,
    pub handle: SchedulerHandle,
}

pub(crate) fn build_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    anyhow::ensure!(
        !config.sources.is_empty(),
        "no sources configured; add [[sources]] entries to the config file"
    );

    let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::with_capacity(config.sources.len());
    for source_config in &config.sources {
        let source = HttpQuoteSource::new(HttpSourceConfig::from(source_config))
            .with_context(|| format!("failed to build source '{}'", source_config.id))?;
        sources.push(Arc::new(source));
    }

    let cache = Arc::new(OpportunityCache::new());
    let broadcaster = Arc::new(ChangeBroadcaster::new(&config.broadcast));

    let (scheduler, handle) = RefreshScheduler::new(
        sources,
        Arc::clone(&cache),
        Arc::clone(&broadcaster),
        config.refresh.clone(),
        config.tiers,
    );
    let scheduler = scheduler.with_sink(Arc::new(LoggingSink));
    tokio::spawn(scheduler.run());

    Ok(Engine {
        cache,
        broadcaster,
        handle,
    })
}
