//! American odds conversions.
//!
//! All pricing in the engine goes through these conversions: American odds
//! to decimal odds, decimal odds to implied probability, and the EV of a
//! price against a fair probability.

// =============================================================================
// Conversions
// =============================================================================

/// Converts American odds to decimal odds.
///
/// +150 becomes 2.5, -110 becomes ~1.909. Returns `None` for prices in the
/// open interval (-100, 100), which are not valid American odds.
#[must_use]
pub fn decimal_odds(american: i32) -> Option<f64> {
    if !is_valid_american(american) {
        return None;
    }
    if american > 0 {
        Some(1.0 + f64::from(american) / 100.0)
    } else {
        Some(1.0 + 100.0 / f64::from(-american))
    }
}

/// Converts American odds to the probability implied by the price.
///
/// The implied probability still contains the book's margin; devigging
/// happens downstream in the fair-price engine.
#[must_use]
pub fn implied_probability(american: i32) -> Option<f64> {
    decimal_odds(american).map(|d| 1.0 / d)
}

/// Returns the EV percentage of a price against a fair probability.
///
/// Negative values are meaningful (no edge) and are not clamped.
#[must_use]
pub fn ev_percent(american: i32, fair_probability: f64) -> Option<f64> {
    decimal_odds(american).map(|d| (d * fair_probability - 1.0) * 100.0)
}

/// Returns true if the price is a valid American odds value.
#[must_use]
pub fn is_valid_american(american: i32) -> bool {
    american >= 100 || american <= -100
}

/// Formats American odds with their conventional sign ("+150", "-110").
#[must_use]
pub fn format_american(american: i32) -> String {
    if american > 0 {
        format!("+{american}")
    } else {
        format!("{american}")
    }
}
