//! Duplicate detection
//!
//! Finds activities that likely describe one real-world event entered twice:
//! same normalized client name, same calendar day, similar amount. Flagging
//! uses a higher threshold than linking because a wrong merge costs more
//! than a wrong link.

use tracing::debug;

use crate::confidence::ConfidenceEngine;
use crate::config::ReconcilerConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Activity, DuplicateSuspect};
use crate::similarity::amount_correlation;

/// Duplicate detector over the activity table
pub struct DuplicateDetector<'a> {
    db: &'a Database,
    config: &'a ReconcilerConfig,
    engine: ConfidenceEngine,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(db: &'a Database, config: &'a ReconcilerConfig) -> Result<Self> {
        let engine = ConfidenceEngine::new(config.weights, config.thresholds)?;
        Ok(Self { db, config, engine })
    }

    /// Scan for duplicate suspects, optionally scoped to one owner
    pub fn find_duplicates(&self, owner: Option<&str>) -> Result<Vec<DuplicateSuspect>> {
        let activities = self.db.list_active_activities(owner)?;
        let mut suspects = Vec::new();

        // list_active_activities orders by (normalized name, date, id), so
        // groups arrive as contiguous runs
        let mut group_start = 0;
        for i in 1..=activities.len() {
            let boundary = i == activities.len()
                || !same_group(&activities[group_start], &activities[i]);
            if !boundary {
                continue;
            }
            let group = &activities[group_start..i];
            if group.len() > 1 {
                self.score_group(group, &mut suspects);
            }
            group_start = i;
        }

        suspects.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!(suspects = suspects.len(), "duplicate scan complete");
        Ok(suspects)
    }

    fn score_group(&self, group: &[Activity], out: &mut Vec<DuplicateSuspect>) {
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                // Same normalized name and same day by construction: name and
                // date sub-scores are pinned at 100, only amount discriminates
                let amount_score = amount_correlation(a.amount, b.amount);
                let confidence = self.engine.confidence(100.0, 100.0, amount_score);
                if confidence >= self.config.duplicate_threshold {
                    out.push(DuplicateSuspect {
                        // The earlier-created record is the keep side
                        keep_id: a.id.min(b.id),
                        drop_id: a.id.max(b.id),
                        client_name_normalized: a.client_name_normalized.clone(),
                        activity_date: a.activity_date,
                        confidence,
                    });
                }
            }
        }
    }
}

fn same_group(a: &Activity, b: &Activity) -> bool {
    a.client_name_normalized == b.client_name_normalized && a.activity_date == b.activity_date
}
