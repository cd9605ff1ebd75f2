//! Reconciliation configuration

use crate::confidence::{ConfidenceThresholds, ScoringWeights};
use crate::error::Result;
use crate::similarity::DEFAULT_DATE_TOLERANCE_DAYS;

/// Tunable knobs for the whole reconciliation pipeline
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Sub-score weights (name/date/amount), must sum to 1.0
    pub weights: ScoringWeights,
    /// Confidence band thresholds (auto_link 90, needs_review 60)
    pub thresholds: ConfidenceThresholds,
    /// Aggressive mode also applies needs_review candidates at or above this
    pub aggressive_threshold: f64,
    /// Duplicate suspects need a higher bar than links: a false-positive
    /// merge is costlier than a false-positive link
    pub duplicate_threshold: f64,
    /// Date tolerance in days for proximity scoring
    pub date_tolerance_days: i64,
    /// Date window in days for the candidate pre-fetch
    pub candidate_window_days: i64,
    /// Cap on candidates scored per orphan, ranked by the cheap prefilter
    pub max_candidates_per_orphan: usize,
    /// Minimum name similarity for the prefilter to keep a pair
    pub prefilter_min_similarity: f64,
    /// Match records across owners instead of same-owner only
    pub match_across_owners: bool,
    /// Orphans processed per batch
    pub batch_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            thresholds: ConfidenceThresholds::default(),
            aggressive_threshold: 75.0,
            duplicate_threshold: 90.0,
            date_tolerance_days: DEFAULT_DATE_TOLERANCE_DAYS,
            candidate_window_days: DEFAULT_DATE_TOLERANCE_DAYS,
            max_candidates_per_orphan: 5,
            prefilter_min_similarity: 70.0,
            match_across_owners: false,
            batch_size: 500,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.batch_size == 0 {
            return Err(crate::error::Error::Validation(
                "batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ReconcilerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = ReconcilerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
