//! Similarity scoring curves
//!
//! Three pure sub-scores on a 0-100 scale, combined by the confidence
//! engine. Kept as standalone functions with explicit curves because this is
//! the part of the system most likely to need tuning.

use chrono::NaiveDate;

/// Default date tolerance in days for proximity scoring
pub const DEFAULT_DATE_TOLERANCE_DAYS: i64 = 2;

/// Score returned by `amount_correlation` when either amount is absent.
/// Absence is not evidence of a mismatch, so it scores neutral rather than 0.
pub const AMOUNT_NEUTRAL_SCORE: f64 = 50.0;

/// Textual similarity between two normalized names, 0-100.
///
/// Normalized Levenshtein: identical strings score 100, completely dissimilar
/// strings near 0, degrading gracefully with length difference. Symmetric in
/// its arguments.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Temporal proximity between two dates, 0-100.
///
/// 100 at zero delta, decaying linearly to 0 at `tolerance_days`, 0 beyond.
pub fn date_proximity(d1: NaiveDate, d2: NaiveDate, tolerance_days: i64) -> f64 {
    if tolerance_days <= 0 {
        return if d1 == d2 { 100.0 } else { 0.0 };
    }
    let delta = (d1 - d2).num_days().abs();
    if delta >= tolerance_days {
        0.0
    } else {
        100.0 * (1.0 - delta as f64 / tolerance_days as f64)
    }
}

/// Correlation between two monetary amounts, 0-100.
///
/// 100 when equal (including both zero); decays with the relative difference
/// `|a - b| / max(|a|, |b|)`; neutral 50 when either amount is absent.
pub fn amount_correlation(a: Option<f64>, b: Option<f64>) -> f64 {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return AMOUNT_NEUTRAL_SCORE,
    };

    let max = a.abs().max(b.abs());
    if max == 0.0 {
        return 100.0;
    }
    let relative_diff = (a - b).abs() / max;
    (100.0 * (1.0 - relative_diff)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_name_identical() {
        assert_eq!(name_similarity("acme", "acme"), 100.0);
    }

    #[test]
    fn test_name_symmetric() {
        let ab = name_similarity("acme widgets", "acme widget co");
        let ba = name_similarity("acme widget co", "acme widgets");
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_name_dissimilar_scores_low() {
        assert!(name_similarity("acme", "globex industries") < 30.0);
    }

    #[test]
    fn test_name_near_match_scores_high() {
        assert!(name_similarity("acme widgets", "acme widget") > 85.0);
    }

    #[test]
    fn test_name_empty_inputs() {
        assert_eq!(name_similarity("", ""), 100.0);
        assert_eq!(name_similarity("acme", ""), 0.0);
        assert_eq!(name_similarity("", "acme"), 0.0);
    }

    #[test]
    fn test_date_zero_delta() {
        let d = date(2024, 1, 15);
        assert_eq!(date_proximity(d, d, 2), 100.0);
    }

    #[test]
    fn test_date_linear_decay() {
        // 1-day delta inside a +/-2 day tolerance scores 50
        assert_eq!(date_proximity(date(2024, 1, 15), date(2024, 1, 16), 2), 50.0);
        assert_eq!(date_proximity(date(2024, 1, 16), date(2024, 1, 15), 2), 50.0);
    }

    #[test]
    fn test_date_beyond_tolerance() {
        assert_eq!(date_proximity(date(2024, 1, 15), date(2024, 1, 17), 2), 0.0);
        assert_eq!(date_proximity(date(2024, 1, 15), date(2024, 3, 1), 2), 0.0);
    }

    #[test]
    fn test_amount_equal() {
        assert_eq!(amount_correlation(Some(5000.0), Some(5000.0)), 100.0);
        assert_eq!(amount_correlation(Some(0.0), Some(0.0)), 100.0);
    }

    #[test]
    fn test_amount_missing_is_neutral() {
        assert_eq!(amount_correlation(None, Some(5000.0)), AMOUNT_NEUTRAL_SCORE);
        assert_eq!(amount_correlation(Some(5000.0), None), AMOUNT_NEUTRAL_SCORE);
        assert_eq!(amount_correlation(None, None), AMOUNT_NEUTRAL_SCORE);
    }

    #[test]
    fn test_amount_relative_decay() {
        // 10% relative difference -> 90
        let score = amount_correlation(Some(900.0), Some(1000.0));
        assert!((score - 90.0).abs() < 1e-9);
        // Wildly different amounts bottom out near 0, never negative
        assert!(amount_correlation(Some(1.0), Some(1_000_000.0)) >= 0.0);
    }

    #[test]
    fn test_determinism() {
        for _ in 0..3 {
            assert_eq!(name_similarity("acme corp", "acme"), name_similarity("acme corp", "acme"));
            assert_eq!(
                amount_correlation(Some(123.45), Some(120.0)),
                amount_correlation(Some(123.45), Some(120.0))
            );
        }
    }
}
