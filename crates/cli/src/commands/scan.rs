use oddsight_core::{CycleOutcome, Opportunity};
use oddsight_web_api::OpportunityView;

use super::{build_engine, load_config};

/// Runs one refresh cycle and prints the priced opportunities.
pub async fn run(
    config_path: &str,
    profile: Option<&str>,
    min_ev: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, profile)?;
    let engine = build_engine(&config)?;

    let run = engine
        .handle
        .trigger_refresh()
        .await
        .ok_or_else(|| anyhow::anyhow!("scheduler exited before the scan completed"))?;

    if run.outcome == CycleOutcome::Failed {
        engine.handle.shutdown();
        anyhow::bail!(
            "scan failed: all {} sources unreachable",
            run.sources_attempted
        );
    }

    let snapshot = engine.cache.current();
    let mut opportunities: Vec<&Opportunity> = snapshot
        .opportunities
        .values()
        .filter(|opp| min_ev.map_or(true, |min| opp.ev_percent_rounded() >= min))
        .collect();
    opportunities.sort_by(|a, b| b.ev_percent.total_cmp(&a.ev_percent));

    if json {
        let views: Vec<OpportunityView> =
            opportunities.iter().map(|opp| OpportunityView::from(*opp)).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        print_table(&opportunities);
        println!(
            "\n{} opportunities, {} of {} sources succeeded, {}ms",
            opportunities.len(),
            run.sources_succeeded(),
            run.sources_attempted,
            run.duration_ms
        );
    }

    engine.handle.shutdown();
    Ok(())
}

fn print_table(opportunities: &[&Opportunity]) {
    println!(
        "{:<40} {:>7} {:>6} {:>8} {:>9} {:>6}",
        "KEY", "EV%", "TIER", "BEST", "FAIR", "BOOKS"
    );

    for opp in opportunities {
        let flag = if opp.low_confidence { "?" } else { "" };
        println!(
            "{:<40} {:>7.1} {:>6} {:>8} {:>9.4} {:>5}{}",
            opp.key.to_string(),
            opp.ev_percent_rounded(),
            opp.tier,
            oddsight_core::odds::format_american(opp.best_quote.price_american),
            opp.fair_probability,
            opp.book_count(),
            flag
        );
    }
}
