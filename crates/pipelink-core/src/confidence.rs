//! Confidence engine
//!
//! Combines the three similarity sub-scores into a single 0-100 match
//! confidence and classifies the pair into an action band. No I/O; a
//! deterministic function over pre-computed sub-scores.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Classification;

/// Relative weights for the three sub-scores. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub name: f64,
    pub date: f64,
    pub amount: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            name: 0.5,
            date: 0.3,
            amount: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Reject weights that don't sum to 1.0 (within floating-point slack)
    pub fn validate(&self) -> Result<()> {
        let sum = self.name + self.date + self.amount;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(Error::Validation(format!(
                "scoring weights must sum to 1.0, got {}",
                sum
            )));
        }
        if self.name < 0.0 || self.date < 0.0 || self.amount < 0.0 {
            return Err(Error::Validation("scoring weights must be non-negative".into()));
        }
        Ok(())
    }
}

/// Confidence thresholds for the three bands
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// confidence >= this -> auto_link
    pub auto_link: f64,
    /// auto_link > confidence >= this -> needs_review
    pub needs_review: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            auto_link: 90.0,
            needs_review: 60.0,
        }
    }
}

/// Confidence engine holding weights and band thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEngine {
    pub weights: ScoringWeights,
    pub thresholds: ConfidenceThresholds,
}

impl ConfidenceEngine {
    pub fn new(weights: ScoringWeights, thresholds: ConfidenceThresholds) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights, thresholds })
    }

    /// Weighted combination of the three sub-scores, 0-100
    pub fn confidence(&self, name_score: f64, date_score: f64, amount_score: f64) -> f64 {
        self.weights.name * name_score
            + self.weights.date * date_score
            + self.weights.amount * amount_score
    }

    /// Band a confidence value. Each threshold is inclusive for its own band:
    /// exactly 90.0 is auto_link, anything below falls through.
    pub fn classify(&self, confidence: f64) -> Classification {
        if confidence >= self.thresholds.auto_link {
            Classification::AutoLink
        } else if confidence >= self.thresholds.needs_review {
            Classification::NeedsReview
        } else {
            Classification::Reject
        }
    }

    /// Score and classify in one step
    pub fn score(
        &self,
        name_score: f64,
        date_score: f64,
        amount_score: f64,
    ) -> (f64, Classification) {
        let confidence = self.confidence(name_score, date_score, amount_score);
        (confidence, self.classify(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_valid() {
        ScoringWeights::default().validate().unwrap();
    }

    #[test]
    fn test_bad_weights_rejected() {
        let w = ScoringWeights {
            name: 0.5,
            date: 0.5,
            amount: 0.5,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_worked_example() {
        // Activity {client: "Acme Corp", amount: 5000, date: 2024-01-15} vs
        // deal {company: "ACME CORP.", value: 5000, wonDate: 2024-01-16}:
        // name 100, date 50 (1-day delta in +/-2), amount 100
        // -> 0.5*100 + 0.3*50 + 0.2*100 = 85 -> needs_review, not auto-linked
        let engine = ConfidenceEngine::default();
        let (confidence, class) = engine.score(100.0, 50.0, 100.0);
        assert!((confidence - 85.0).abs() < 1e-9);
        assert_eq!(class, Classification::NeedsReview);
    }

    #[test]
    fn test_boundary_values() {
        let engine = ConfidenceEngine::default();
        assert_eq!(engine.classify(90.0), Classification::AutoLink);
        assert_eq!(engine.classify(89.999), Classification::NeedsReview);
        assert_eq!(engine.classify(60.0), Classification::NeedsReview);
        assert_eq!(engine.classify(59.999), Classification::Reject);
        assert_eq!(engine.classify(0.0), Classification::Reject);
        assert_eq!(engine.classify(100.0), Classification::AutoLink);
    }

    #[test]
    fn test_determinism() {
        let engine = ConfidenceEngine::default();
        let a = engine.score(87.3, 50.0, 62.1);
        let b = engine.score(87.3, 50.0, 62.1);
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }
}
