use oddsight_web_api::ApiServer;

use super::{build_engine, load_config};

/// Runs the refresh engine and web API until interrupted.
pub async fn run(config_path: &str, profile: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path, profile)?;
    tracing::info!(
        sources = config.sources.len(),
        "starting odds engine with config: {}",
        config_path
    );

    let engine = build_engine(&config)?;

    // Warm the cache before accepting traffic.
    if let Some(run) = engine.handle.trigger_refresh().await {
        tracing::info!(outcome = %run.outcome, "initial refresh complete");
    }

    let server = ApiServer::new(
        engine.cache,
        engine.broadcaster,
        engine.handle.clone(),
        &config.refresh,
    );
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let shutdown_handle = engine.handle.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        shutdown_handle.shutdown();
    });

    let cancel = engine.handle.cancellation_token();
    tokio::select! {
        result = server.serve(&addr) => result?,
        () = cancel.cancelled() => {}
    }

    tracing::info!("odds engine stopped");
    Ok(())
}
