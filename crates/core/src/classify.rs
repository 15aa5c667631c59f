//! EV tier classification.
//!
//! Maps an EV percentage to a discrete tier using configured thresholds.
//! Classification is a total, deterministic function: every finite EV maps
//! to exactly one tier, and non-finite values fall through to `Tier::None`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Tier
// =============================================================================

/// Discrete quality tier for an opportunity's EV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Strong edge.
    Great,
    /// Solid edge.
    Good,
    /// Positive but thin edge.
    Marginal,
    /// No edge.
    None,
}

impl Tier {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Great => "great",
            Self::Good => "good",
            Self::Marginal => "marginal",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Thresholds
// =============================================================================

/// Error returned when thresholds are not monotonic.
#[derive(Debug, Error)]
#[error("tier thresholds must satisfy great ({great_min_ev}) > good ({good_min_ev}) > 0")]
pub struct InvalidThresholds {
    /// Configured great cutoff.
    pub great_min_ev: f64,
    /// Configured good cutoff.
    pub good_min_ev: f64,
}

/// EV cutoffs for tier classification, in percent.
///
/// The defaults are operational starting points, not part of the
/// classification contract; deployments tune them via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Minimum EV% for `Tier::Great`.
    pub great_min_ev: f64,

    /// Minimum EV% for `Tier::Good`.
    pub good_min_ev: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            great_min_ev: 10.0,
            good_min_ev: 4.5,
        }
    }
}

impl TierThresholds {
    /// Creates thresholds, validating monotonicity.
    ///
    /// # Errors
    /// Returns an error unless `great_min_ev > good_min_ev > 0`.
    pub fn new(great_min_ev: f64, good_min_ev: f64) -> Result<Self, InvalidThresholds> {
        let thresholds = Self {
            great_min_ev,
            good_min_ev,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Validates that the cutoffs are monotonic and positive.
    ///
    /// # Errors
    /// Returns an error unless `great_min_ev > good_min_ev > 0`.
    pub fn validate(&self) -> Result<(), InvalidThresholds> {
        if self.great_min_ev > self.good_min_ev && self.good_min_ev > 0.0 {
            Ok(())
        } else {
            Err(InvalidThresholds {
                great_min_ev: self.great_min_ev,
                good_min_ev: self.good_min_ev,
            })
        }
    }

    /// Classifies an EV percentage into a tier.
    ///
    /// Total over all `f64` values: NaN and negative infinity map to
    /// `Tier::None`, positive infinity to `Tier::Great`.
    #[must_use]
    pub fn classify(&self, ev_percent: f64) -> Tier {
        if ev_percent >= self.great_min_ev {
            Tier::Great
        } else if ev_percent >= self.good_min_ev {
            Tier::Good
        } else if ev_percent > 0.0 {
            Tier::Marginal
        } else {
            Tier::None
        }
    }
}
