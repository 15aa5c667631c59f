//! Fair pricing and EV annotation.
//!
//! Converts each book's American price to an implied probability, removes
//! the book's built-in margin ("vig") proportionally across the outcome
//! set it quotes for the market, averages the devigged probabilities
//! across books into a consensus fair probability, and annotates the
//! highest-EV quote.

use chrono::{DateTime, Utc};
use oddsight_core::odds;
use oddsight_core::{Opportunity, OpportunityKey, Snapshot, SourceId, TierThresholds};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::consolidate::CandidateOpportunity;

/// Per-market, per-book sum of implied probabilities (the overround) and
/// the number of selections contributing to it.
type MarketOverrounds = BTreeMap<(String, String), BTreeMap<SourceId, (f64, usize)>>;

/// Prices a full cycle's candidates.
///
/// Pricing is market-wide: devigging one selection needs the implied
/// probabilities of every outcome the same book quotes for that market,
/// so candidates are priced together rather than one key at a time.
/// `fair_probability` and `ev_percent` are always computed together from
/// the current book quotes; candidates whose quotes are all invalid are
/// dropped rather than left stale.
#[must_use]
pub fn price_all(
    candidates: &BTreeMap<OpportunityKey, CandidateOpportunity>,
    previous: &Snapshot,
    thresholds: &TierThresholds,
    now: DateTime<Utc>,
) -> BTreeMap<OpportunityKey, Opportunity> {
    let overrounds = market_overrounds(candidates);
    let mut priced = BTreeMap::new();

    for candidate in candidates.values() {
        match price_one(candidate, &overrounds, previous, thresholds, now) {
            Some(opportunity) => {
                priced.insert(opportunity.key.clone(), opportunity);
            }
            None => {
                debug!(key = %candidate.key, "dropping candidate with no priceable quotes");
            }
        }
    }

    priced
}

/// Sums each book's implied probabilities across the selections it quotes
/// per (event, market).
fn market_overrounds(candidates: &BTreeMap<OpportunityKey, CandidateOpportunity>) -> MarketOverrounds {
    let mut overrounds: MarketOverrounds = BTreeMap::new();

    for candidate in candidates.values() {
        let market = candidate.key.market();
        for (source, quote) in &candidate.book_quotes {
            if let Some(implied) = odds::implied_probability(quote.price_american) {
                let entry = overrounds
                    .entry(market.clone())
                    .or_default()
                    .entry(source.clone())
                    .or_insert((0.0, 0));
                entry.0 += implied;
                entry.1 += 1;
            }
        }
    }

    overrounds
}

fn price_one(
    candidate: &CandidateOpportunity,
    overrounds: &MarketOverrounds,
    previous: &Snapshot,
    thresholds: &TierThresholds,
    now: DateTime<Utc>,
) -> Option<Opportunity> {
    let market = candidate.key.market();
    let by_source = overrounds.get(&market);

    let mut devigged = Vec::new();
    let mut undevigged = Vec::new();
    let mut book_quotes = BTreeMap::new();

    for (source, quote) in &candidate.book_quotes {
        let Some(implied) = odds::implied_probability(quote.price_american) else {
            trace!(key = %candidate.key, %source, price = quote.price_american,
                "skipping invalid American price");
            continue;
        };

        // A book can only be devigged when it quotes at least two outcomes
        // of this market; one outcome alone carries no margin information.
        match by_source.and_then(|m| m.get(source)) {
            Some(&(overround, selections)) if selections >= 2 => {
                devigged.push(implied / overround);
            }
            _ => undevigged.push(implied),
        }

        book_quotes.insert(source.clone(), quote.clone());
    }

    if book_quotes.is_empty() {
        return None;
    }

    // Books that could not be devigged still contribute their raw implied
    // probability; confidence is low only when no book could be devigged.
    let low_confidence = devigged.is_empty();
    let probabilities: Vec<f64> = devigged.into_iter().chain(undevigged).collect();
    let fair_probability = probabilities.iter().sum::<f64>() / probabilities.len() as f64;

    // Best quote maximizes EV against the consensus, not raw price.
    let (best_source, best_ev) = book_quotes
        .iter()
        .filter_map(|(source, quote)| {
            odds::ev_percent(quote.price_american, fair_probability).map(|ev| (source.clone(), ev))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    let best_quote = book_quotes[&best_source].clone();

    let version = previous.get(&candidate.key).map_or(1, |o| o.version + 1);

    trace!(
        key = %candidate.key,
        fair_probability,
        ev_percent = best_ev,
        books = book_quotes.len(),
        low_confidence,
        "priced opportunity"
    );

    Some(Opportunity {
        key: candidate.key.clone(),
        book_quotes,
        fair_probability,
        best_quote,
        ev_percent: best_ev,
        tier: thresholds.classify(best_ev),
        low_confidence,
        version,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsight_core::classify::Tier;
    use oddsight_core::RawQuote;

    fn quote(source: &str, selection: &str, price: i32) -> RawQuote {
        RawQuote::new(source, "evt-1", "moneyline", selection, price, Utc::now())
    }

    fn candidates_from(quotes: Vec<RawQuote>) -> BTreeMap<OpportunityKey, CandidateOpportunity> {
        let mut map: BTreeMap<OpportunityKey, CandidateOpportunity> = BTreeMap::new();
        for q in quotes {
            let key = q.key();
            map.entry(key.clone())
                .or_insert_with(|| CandidateOpportunity {
                    key,
                    book_quotes: BTreeMap::new(),
                })
                .book_quotes
                .insert(q.source_id.clone(), q);
        }
        map
    }

    fn price(
        quotes: Vec<RawQuote>,
    ) -> BTreeMap<OpportunityKey, Opportunity> {
        price_all(
            &candidates_from(quotes),
            &Snapshot::empty(),
            &TierThresholds::default(),
            Utc::now(),
        )
    }

    // ==================== Devig Tests ====================

    #[test]
    fn test_two_books_at_minus_110_each_side() {
        // Two books quote -110/-110 on a two-outcome market.
        // Devigged fair probability per side is 0.5; EV is ~-4.545%; no edge.
        let priced = price(vec![
            quote("dk", "home", -110),
            quote("dk", "away", -110),
            quote("fd", "home", -110),
            quote("fd", "away", -110),
        ]);

        assert_eq!(priced.len(), 2);
        for opp in priced.values() {
            assert!((opp.fair_probability - 0.5).abs() < 1e-9);
            assert!((opp.ev_percent - (-100.0 / 22.0)).abs() < 1e-6);
            assert_eq!(opp.tier, Tier::None);
            assert!(!opp.low_confidence);
        }
    }

    #[test]
    fn test_generous_book_has_positive_ev() {
        // Three sharp books at -110/-110 pin fair at 0.5; one book hangs
        // +120 on the home side. decimal(+120) = 2.2, EV vs consensus > 0.
        let mut quotes = Vec::new();
        for book in ["dk", "fd", "mgm"] {
            quotes.push(quote(book, "home", -110));
            quotes.push(quote(book, "away", -110));
        }
        quotes.push(quote("soft", "home", 120));
        quotes.push(quote("soft", "away", -150));

        let priced = price(quotes);
        let home = &priced[&OpportunityKey::new("evt-1", "moneyline", "home")];

        assert_eq!(home.best_quote.source_id, "soft");
        assert!(home.ev_percent > 0.0);
        assert!(home.is_positive_ev());
    }

    #[test]
    fn test_single_book_both_sides_is_devigged() {
        let priced = price(vec![quote("dk", "home", -110), quote("dk", "away", -110)]);
        let home = &priced[&OpportunityKey::new("evt-1", "moneyline", "home")];

        assert!((home.fair_probability - 0.5).abs() < 1e-9);
        assert!(!home.low_confidence);
    }

    #[test]
    fn test_single_book_single_side_is_low_confidence() {
        // No complementary outcome: raw implied probability, flagged.
        let priced = price(vec![quote("dk", "home", -110)]);
        let home = &priced[&OpportunityKey::new("evt-1", "moneyline", "home")];

        assert!(home.low_confidence);
        assert!((home.fair_probability - 110.0 / 210.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_outcome_market_devigs_full_set() {
        // Soccer-style 1X2: devig within the full three-outcome set.
        let priced = price(vec![
            quote("dk", "home", 150),
            quote("dk", "draw", 240),
            quote("dk", "away", 210),
        ]);

        let total: f64 = priced.values().map(|o| o.fair_probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for opp in priced.values() {
            assert!(!opp.low_confidence);
        }
    }

    // ==================== Invariant Tests ====================

    #[test]
    fn test_fair_probability_in_open_unit_interval() {
        let priced = price(vec![
            quote("dk", "home", -350),
            quote("dk", "away", 280),
            quote("fd", "home", -380),
            quote("fd", "away", 300),
        ]);

        for opp in priced.values() {
            assert!(opp.fair_probability > 0.0 && opp.fair_probability < 1.0);
            assert!(opp.ev_percent.is_finite());
        }
    }

    #[test]
    fn test_version_increments_for_existing_key() {
        let first = price(vec![quote("dk", "home", -110), quote("dk", "away", -110)]);
        let previous = Snapshot::new(1, first, Utc::now());

        let second = price_all(
            &candidates_from(vec![quote("dk", "home", -108), quote("dk", "away", -112)]),
            &previous,
            &TierThresholds::default(),
            Utc::now(),
        );

        let home = &second[&OpportunityKey::new("evt-1", "moneyline", "home")];
        assert_eq!(home.version, 2);

        // Recomputed together: fair and EV reflect the new quotes.
        assert!((home.fair_probability - previous.opportunities[&home.key].fair_probability).abs() > 0.0);
    }

    #[test]
    fn test_ev_rounding_only_at_boundary() {
        let priced = price(vec![
            quote("dk", "home", -110),
            quote("dk", "away", -110),
        ]);
        let home = &priced[&OpportunityKey::new("evt-1", "moneyline", "home")];

        // Full precision internally, one decimal at the boundary.
        assert!((home.ev_percent_rounded() - (-4.5)).abs() < 1e-9);
        assert!((home.ev_percent - home.ev_percent_rounded()).abs() > 1e-9);
    }
}
