//! Probability → risk tier mapping.
//!
//! | p range            | tier     |
//! |--------------------|----------|
//! | p < 0.30           | Low      |
//! | 0.30 ≤ p < 0.60    | Moderate |
//! | 0.60 ≤ p < 0.80    | High     |
//! | p ≥ 0.80           | Critical |
//!
//! Each band includes its lower bound. The positive/negative label uses its
//! own cut at 0.50 and does not depend on the tier.

use serde::{Deserialize, Serialize};

/// Lower bound of the Moderate band.
pub const MODERATE_THRESHOLD: f64 = 0.30;
/// Lower bound of the High band.
pub const HIGH_THRESHOLD: f64 = 0.60;
/// Lower bound of the Critical band.
pub const CRITICAL_THRESHOLD: f64 = 0.80;
/// Probabilities at or above this are labelled positive.
pub const DECISION_THRESHOLD: f64 = 0.50;

/// Ordinal screening risk. Ordering follows severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskTier {
    pub fn from_probability(p: f64) -> Self {
        if p >= CRITICAL_THRESHOLD {
            RiskTier::Critical
        } else if p >= HIGH_THRESHOLD {
            RiskTier::High
        } else if p >= MODERATE_THRESHOLD {
            RiskTier::Moderate
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Moderate => "Moderate",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary screening outcome.
pub fn is_positive(p: f64) -> bool {
    p >= DECISION_THRESHOLD
}

/// Positive-class probability as a one-decimal percentage, e.g. `"73.4%"`.
pub fn confidence_display(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}
