//! The record handed to report/consultation layers.
//!
//! Downstream consumers treat it as read-only; they must not recompute the
//! probability or the tier.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScreeningError};
use crate::risk::{self, RiskTier};

pub const POSITIVE_LABEL: &str = "Parkinson Detected";
pub const NEGATIVE_LABEL: &str = "No Parkinson Detected";

/// Outcome of one screening call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// `"Parkinson Detected"` or `"No Parkinson Detected"`.
    pub prediction: String,
    /// Positive-class probability in [0, 1].
    pub probability: f64,
    pub risk_level: RiskTier,
    /// `probability` as a one-decimal percentage string.
    pub confidence: String,
}

impl PredictionResult {
    /// Derive label, tier and display string from a positive-class probability.
    ///
    /// # Errors
    /// `ScreeningError::InvalidProbability` for NaN or infinite input.
    pub fn from_probability(p: f64) -> Result<Self> {
        if !p.is_finite() {
            return Err(ScreeningError::InvalidProbability(p));
        }
        let p = p.clamp(0.0, 1.0);
        let prediction = if risk::is_positive(p) {
            POSITIVE_LABEL
        } else {
            NEGATIVE_LABEL
        };
        Ok(Self {
            prediction: prediction.to_string(),
            probability: p,
            risk_level: RiskTier::from_probability(p),
            confidence: risk::confidence_display(p),
        })
    }

    pub fn is_positive(&self) -> bool {
        self.prediction == POSITIVE_LABEL
    }
}
