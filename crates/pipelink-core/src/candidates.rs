//! Candidate generation
//!
//! Scans the store for orphan activities and orphan won deals and produces a
//! bounded set of plausible counterparts for each, rather than scoring the
//! full cross-product. A cheap prefilter (date window in SQL, then name
//! similarity in memory) ranks the pool; only the capped top slice gets the
//! full three-factor score.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::confidence::ConfidenceEngine;
use crate::config::ReconcilerConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Activity, CandidateFilter, Deal, MatchCandidate};
use crate::similarity::{amount_correlation, date_proximity, name_similarity};

/// Candidate generator over the record store
pub struct CandidateGenerator<'a> {
    db: &'a Database,
    config: &'a ReconcilerConfig,
    engine: ConfidenceEngine,
    /// Pairs a reviewer rejected; never proposed again until the review is
    /// rolled back
    excluded: HashSet<(i64, i64)>,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(db: &'a Database, config: &'a ReconcilerConfig) -> Result<Self> {
        let engine = ConfidenceEngine::new(config.weights, config.thresholds)?;
        let excluded = db.reviewed_rejected_pairs()?;
        Ok(Self {
            db,
            config,
            engine,
            excluded,
        })
    }

    /// Full score for one activity/deal pair
    pub fn score_pair(&self, activity: &Activity, deal: &Deal) -> MatchCandidate {
        let name_score = name_similarity(
            &activity.client_name_normalized,
            &deal.company_name_normalized,
        );
        let date_score = date_proximity(
            activity.activity_date,
            deal.stage_changed_at,
            self.config.date_tolerance_days,
        );
        let amount_score = amount_correlation(activity.amount, Some(deal.total_value()));
        let (confidence, classification) = self.engine.score(name_score, date_score, amount_score);

        MatchCandidate {
            activity_id: activity.id,
            deal_id: deal.id,
            name_score,
            date_score,
            amount_score,
            confidence,
            classification,
        }
    }

    /// Cheap prefilter rank for a pair of normalized names, or None when the
    /// pair isn't plausible. A non-trivial shared substring passes outright;
    /// otherwise the pair needs similarity at or above the configured floor.
    fn prefilter_rank(&self, a: &str, b: &str) -> Option<f64> {
        if a.is_empty() || b.is_empty() {
            return None;
        }
        let similarity = name_similarity(a, b);
        let substring_hit =
            (a.len() >= 3 && b.contains(a)) || (b.len() >= 3 && a.contains(b));
        if substring_hit || similarity >= self.config.prefilter_min_similarity {
            Some(similarity)
        } else {
            None
        }
    }

    /// Scored candidates for one orphan activity, best first, capped.
    /// An empty result means "unmatched", not an error.
    pub fn candidates_for_activity(&self, activity: &Activity) -> Result<Vec<MatchCandidate>> {
        let owner = if self.config.match_across_owners {
            None
        } else {
            Some(activity.user_id.as_str())
        };

        let pool = self.db.candidate_deals_for_activity(
            activity.activity_date,
            self.config.candidate_window_days,
            owner,
        )?;

        let mut ranked: Vec<(f64, &Deal)> = pool
            .iter()
            .filter(|deal| !self.excluded.contains(&(activity.id, deal.id)))
            .filter_map(|deal| {
                self.prefilter_rank(
                    &activity.client_name_normalized,
                    &deal.company_name_normalized,
                )
                .map(|rank| (rank, deal))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.config.max_candidates_per_orphan);

        let mut candidates: Vec<MatchCandidate> = ranked
            .into_iter()
            .map(|(_, deal)| self.score_pair(activity, deal))
            .collect();
        candidates
            .sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            activity_id = activity.id,
            candidates = candidates.len(),
            "generated candidates for orphan activity"
        );
        Ok(candidates)
    }

    /// Symmetric pass: scored candidates for one orphan won deal
    pub fn candidates_for_deal(&self, deal: &Deal) -> Result<Vec<MatchCandidate>> {
        let owner = if self.config.match_across_owners {
            None
        } else {
            Some(deal.user_id.as_str())
        };

        let pool = self.db.candidate_activities_for_deal(
            deal.stage_changed_at,
            self.config.candidate_window_days,
            owner,
        )?;

        let mut ranked: Vec<(f64, &Activity)> = pool
            .iter()
            .filter(|activity| !self.excluded.contains(&(activity.id, deal.id)))
            .filter_map(|activity| {
                self.prefilter_rank(
                    &activity.client_name_normalized,
                    &deal.company_name_normalized,
                )
                .map(|rank| (rank, activity))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.config.max_candidates_per_orphan);

        let mut candidates: Vec<MatchCandidate> = ranked
            .into_iter()
            .map(|(_, activity)| self.score_pair(activity, deal))
            .collect();
        candidates
            .sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));

        Ok(candidates)
    }

    /// Candidates for every orphan on both sides, deduplicated per pair and
    /// filtered per the caller's `CandidateFilter`
    pub fn generate(&self, filter: &CandidateFilter) -> Result<Vec<MatchCandidate>> {
        let mut by_pair: HashMap<(i64, i64), MatchCandidate> = HashMap::new();
        let owner = filter.owner.as_deref();

        // Orphan activity side, paged by id
        let mut after_id = 0;
        loop {
            let orphans = self
                .db
                .list_orphan_activities(owner, after_id, self.config.batch_size)?;
            if orphans.is_empty() {
                break;
            }
            after_id = orphans.last().map(|a| a.id).unwrap_or(after_id);
            for activity in &orphans {
                if !date_in_range(activity.activity_date, filter) {
                    continue;
                }
                for candidate in self.candidates_for_activity(activity)? {
                    by_pair
                        .entry((candidate.activity_id, candidate.deal_id))
                        .or_insert(candidate);
                }
            }
        }

        // Orphan deal side
        let mut after_id = 0;
        loop {
            let orphans = self
                .db
                .list_orphan_deals(owner, after_id, self.config.batch_size)?;
            if orphans.is_empty() {
                break;
            }
            after_id = orphans.last().map(|d| d.id).unwrap_or(after_id);
            for deal in &orphans {
                if !date_in_range(deal.stage_changed_at, filter) {
                    continue;
                }
                for candidate in self.candidates_for_deal(deal)? {
                    by_pair
                        .entry((candidate.activity_id, candidate.deal_id))
                        .or_insert(candidate);
                }
            }
        }

        let mut candidates: Vec<MatchCandidate> = by_pair
            .into_values()
            .filter(|c| filter.band.map_or(true, |band| c.classification == band))
            .collect();
        candidates
            .sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        Ok(candidates)
    }
}

fn date_in_range(date: chrono::NaiveDate, filter: &CandidateFilter) -> bool {
    if let Some(from) = filter.date_from {
        if date < from {
            return false;
        }
    }
    if let Some(to) = filter.date_to {
        if date > to {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityStatus, ActivityType, Classification, DealStage, NewActivity, NewDeal,
    };
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_activity(
        db: &Database,
        client: &str,
        amount: Option<f64>,
        day: NaiveDate,
        user: &str,
    ) -> i64 {
        match db
            .insert_activity(&NewActivity {
                activity_type: ActivityType::Sale,
                status: ActivityStatus::Completed,
                client_name: client.to_string(),
                amount,
                activity_date: day,
                user_id: user.to_string(),
                import_hash: None,
            })
            .unwrap()
        {
            crate::db::ActivityInsertResult::Inserted(id) => id,
            crate::db::ActivityInsertResult::Duplicate(id) => id,
        }
    }

    fn seed_deal(db: &Database, company: &str, value: f64, day: NaiveDate, user: &str) -> i64 {
        match db
            .insert_deal(&NewDeal {
                company_name: company.to_string(),
                stage: DealStage::Won,
                value_recurring: 0.0,
                value_oneoff: value,
                stage_changed_at: day,
                user_id: user.to_string(),
                import_hash: None,
            })
            .unwrap()
        {
            crate::db::DealInsertResult::Inserted(id) => id,
            crate::db::DealInsertResult::Duplicate(id) => id,
        }
    }

    #[test]
    fn test_worked_example_is_needs_review() {
        let db = Database::in_memory().unwrap();
        let config = ReconcilerConfig::default();
        let activity_id = seed_activity(&db, "Acme Corp", Some(5000.0), date(2024, 1, 15), "u1");
        let deal_id = seed_deal(&db, "ACME CORP.", 5000.0, date(2024, 1, 16), "u1");

        let generator = CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(activity_id).unwrap().unwrap();
        let candidates = generator.candidates_for_activity(&activity).unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.deal_id, deal_id);
        assert_eq!(c.name_score, 100.0);
        assert_eq!(c.date_score, 50.0);
        assert_eq!(c.amount_score, 100.0);
        assert!((c.confidence - 85.0).abs() < 1e-9);
        assert_eq!(c.classification, Classification::NeedsReview);
    }

    #[test]
    fn test_cap_per_orphan() {
        let db = Database::in_memory().unwrap();
        let config = ReconcilerConfig {
            max_candidates_per_orphan: 3,
            ..Default::default()
        };
        let activity_id = seed_activity(&db, "Acme", Some(100.0), date(2024, 3, 1), "u1");
        for i in 0..8 {
            seed_deal(&db, &format!("Acme {}", i), 100.0, date(2024, 3, 1), "u1");
        }

        let generator = CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(activity_id).unwrap().unwrap();
        let candidates = generator.candidates_for_activity(&activity).unwrap();
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_owner_scoping() {
        let db = Database::in_memory().unwrap();
        let config = ReconcilerConfig::default();
        let activity_id = seed_activity(&db, "Acme", Some(100.0), date(2024, 3, 1), "alice");
        seed_deal(&db, "Acme", 100.0, date(2024, 3, 1), "bob");

        let generator = CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(activity_id).unwrap().unwrap();
        assert!(generator.candidates_for_activity(&activity).unwrap().is_empty());

        // Cross-owner matching opens the pool
        let config = ReconcilerConfig {
            match_across_owners: true,
            ..Default::default()
        };
        let generator = CandidateGenerator::new(&db, &config).unwrap();
        assert_eq!(generator.candidates_for_activity(&activity).unwrap().len(), 1);
    }

    #[test]
    fn test_date_window_excludes_far_deals() {
        let db = Database::in_memory().unwrap();
        let config = ReconcilerConfig::default();
        let activity_id = seed_activity(&db, "Acme", Some(100.0), date(2024, 3, 1), "u1");
        seed_deal(&db, "Acme", 100.0, date(2024, 3, 20), "u1");

        let generator = CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(activity_id).unwrap().unwrap();
        assert!(generator.candidates_for_activity(&activity).unwrap().is_empty());
    }

    #[test]
    fn test_dissimilar_names_prefiltered_out() {
        let db = Database::in_memory().unwrap();
        let config = ReconcilerConfig::default();
        let activity_id = seed_activity(&db, "Acme", Some(100.0), date(2024, 3, 1), "u1");
        seed_deal(&db, "Globex Industries", 100.0, date(2024, 3, 1), "u1");

        let generator = CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(activity_id).unwrap().unwrap();
        assert!(generator.candidates_for_activity(&activity).unwrap().is_empty());
    }

    #[test]
    fn test_generate_with_band_filter() {
        let db = Database::in_memory().unwrap();
        let config = ReconcilerConfig::default();
        // Exact match on everything: auto_link band
        seed_activity(&db, "Acme", Some(100.0), date(2024, 3, 1), "u1");
        seed_deal(&db, "Acme", 100.0, date(2024, 3, 1), "u1");
        // One-day-off match: needs_review band
        seed_activity(&db, "Globex", Some(200.0), date(2024, 4, 1), "u1");
        seed_deal(&db, "Globex", 200.0, date(2024, 4, 2), "u1");

        let generator = CandidateGenerator::new(&db, &config).unwrap();
        let all = generator.generate(&CandidateFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let auto = generator
            .generate(&CandidateFilter {
                band: Some(Classification::AutoLink),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].classification, Classification::AutoLink);
    }
}
