//! Quote consolidation.
//!
//! Groups a refresh cycle's raw quotes by (event, market, selection) into
//! candidate opportunities, carrying forward quotes from sources that did
//! not report this cycle so a slow or optional source does not erase every
//! opportunity it used to contribute to. Keys nobody quoted this cycle are
//! simply not emitted; the snapshot build drops them (cycle-based expiry).

use oddsight_core::{OpportunityKey, RawQuote, Snapshot, SourceId};
use std::collections::{BTreeMap, BTreeSet};

/// A consolidated but not yet fair-valued opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOpportunity {
    /// Identity of the opportunity.
    pub key: OpportunityKey,
    /// One quote per book, newest wins within a cycle.
    pub book_quotes: BTreeMap<SourceId, RawQuote>,
}

/// Consolidates one cycle's quotes against the previous snapshot.
///
/// `reporting_sources` are the sources that successfully fetched this
/// cycle: their old entries are replaced wholesale (a reporting book that
/// stopped quoting a selection ages out immediately), while entries from
/// non-reporting sources are left untouched. If one source reports the
/// same key twice in a batch, the later `observed_at` wins.
///
/// Deterministic and idempotent: the same inputs always produce the same
/// candidates.
#[must_use]
pub fn consolidate(
    quotes: &[RawQuote],
    previous: &Snapshot,
    reporting_sources: &BTreeSet<SourceId>,
) -> BTreeMap<OpportunityKey, CandidateOpportunity> {
    let mut candidates: BTreeMap<OpportunityKey, CandidateOpportunity> = BTreeMap::new();

    for quote in quotes {
        let key = quote.key();
        let candidate = candidates.entry(key.clone()).or_insert_with(|| {
            let mut book_quotes = previous
                .get(&key)
                .map(|opp| opp.book_quotes.clone())
                .unwrap_or_default();
            // Reporting sources replace their entries; whatever they did
            // not re-quote this cycle is gone.
            book_quotes.retain(|source, _| !reporting_sources.contains(source));
            CandidateOpportunity { key, book_quotes }
        });

        match candidate.book_quotes.get(&quote.source_id) {
            Some(existing) if existing.observed_at > quote.observed_at => {}
            _ => {
                candidate
                    .book_quotes
                    .insert(quote.source_id.clone(), quote.clone());
            }
        }
    }

    candidates
}
