//! Batch orchestrator
//!
//! `Reconciler` is the public operation surface: analysis, candidate
//! generation, batch execution, progress polling, rollback, and the audit
//! queries. Batch runs walk orphan activities in fixed-size id-ordered
//! batches, persist per-batch progress to `recon_jobs`, and isolate
//! per-candidate failures so one bad pair never aborts a run.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::candidates::CandidateGenerator;
use crate::config::ReconcilerConfig;
use crate::db::Database;
use crate::duplicates::DuplicateDetector;
use crate::error::{Error, Result};
use crate::executor::{ActionExecutor, LinkOutcome, LinkRequest};
use crate::models::{
    ActionTypeStats, AnalysisReport, BatchProgress, BatchResult, CandidateFilter, Classification,
    DailyMetric, DuplicateSuspect, ExecuteOptions, ExecutionMode, IntegrityFinding, JobStatus,
    ManualAction, MatchCandidate, ProgressSnapshot, ReconciliationAction, RollbackResult,
    SYSTEM_ACTOR,
};

/// Reconciliation engine facade
pub struct Reconciler {
    db: Database,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(db: Database, config: ReconcilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { db, config })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Read-only summary of the current state: counts, candidate bands,
    /// duplicate suspects, unmatched orphans. Mutates nothing.
    pub fn analyze(&self, owner: Option<&str>) -> Result<AnalysisReport> {
        let (total_activities, orphan_activities, linked_pairs) = self.db.count_activities()?;
        let (total_deals, orphan_deals, _) = self.db.count_deals()?;

        let generator = CandidateGenerator::new(&self.db, &self.config)?;
        let candidates = generator.generate(&CandidateFilter {
            owner: owner.map(str::to_string),
            ..Default::default()
        })?;

        let auto_link = candidates
            .iter()
            .filter(|c| c.classification == Classification::AutoLink)
            .count();
        let needs_review = candidates
            .iter()
            .filter(|c| c.classification == Classification::NeedsReview)
            .count();
        let matched_activities: HashSet<i64> =
            candidates.iter().map(|c| c.activity_id).collect();
        let unmatched = (orphan_activities as usize).saturating_sub(matched_activities.len());

        let detector = DuplicateDetector::new(&self.db, &self.config)?;
        let suspects = detector.find_duplicates(owner)?;

        Ok(AnalysisReport {
            total_activities,
            total_deals,
            linked_pairs,
            orphan_activities,
            orphan_deals,
            duplicate_suspects: suspects.len(),
            auto_link_candidates: auto_link,
            needs_review_candidates: needs_review,
            unmatched_orphans: unmatched,
        })
    }

    /// Scored candidate pairs, read-only
    pub fn generate_candidates(&self, filter: &CandidateFilter) -> Result<Vec<MatchCandidate>> {
        let generator = CandidateGenerator::new(&self.db, &self.config)?;
        generator.generate(filter)
    }

    /// Duplicate suspects, read-only
    pub fn find_duplicates(&self, owner: Option<&str>) -> Result<Vec<DuplicateSuspect>> {
        let detector = DuplicateDetector::new(&self.db, &self.config)?;
        detector.find_duplicates(owner)
    }

    /// Run a reconciliation pass.
    ///
    /// `DryRun` scores and counts but mutates nothing. `Safe` applies
    /// `auto_link` candidates. `Aggressive` also applies `needs_review`
    /// candidates at or above the secondary threshold. `Manual` applies the
    /// single action in `options.manual_action`. Every run gets a
    /// `recon_jobs` row; per-batch counters accumulate onto it so an
    /// interrupted run is resumable from its `last_offset`.
    pub fn execute(&self, mode: ExecutionMode, options: &ExecuteOptions) -> Result<BatchResult> {
        let job_id = self.db.create_job(mode)?;
        info!(job_id, mode = %mode, "reconciliation run started");

        let outcome = match mode {
            ExecutionMode::Manual => self.execute_manual(job_id, options),
            _ => self.execute_batches(job_id, mode, options),
        };

        match outcome {
            Ok(result) => {
                self.db.finish_job(job_id, JobStatus::Completed)?;
                info!(
                    job_id,
                    processed = result.processed,
                    linked = result.linked,
                    errors = result.errors.len(),
                    "reconciliation run finished"
                );
                Ok(result)
            }
            Err(e) => {
                self.db.finish_job(job_id, JobStatus::Failed)?;
                Err(e)
            }
        }
    }

    fn execute_manual(&self, job_id: i64, options: &ExecuteOptions) -> Result<BatchResult> {
        let action = options
            .manual_action
            .as_ref()
            .ok_or_else(|| Error::Validation("manual mode requires an action".into()))?;
        let actor = options.actor.as_deref().unwrap_or(SYSTEM_ACTOR);
        let executor = ActionExecutor::new(&self.db);

        let mut batch = BatchProgress {
            processed: 1,
            ..Default::default()
        };

        match action {
            ManualAction::Link {
                activity_id,
                deal_id,
                force,
            } => {
                let outcome = executor.link(&LinkRequest {
                    activity_id: *activity_id,
                    deal_id: *deal_id,
                    force: *force,
                    actor: actor.to_string(),
                    confidence: None,
                })?;
                if matches!(outcome, LinkOutcome::Linked { .. }) {
                    batch.linked = 1;
                }
                batch.last_offset = *activity_id;
            }
            ManualAction::CreateDeal { activity_id } => {
                executor.create_deal_from_activity(*activity_id, actor)?;
                batch.deals_created = 1;
                batch.last_offset = *activity_id;
            }
            ManualAction::CreateActivity { deal_id } => {
                executor.create_activity_from_deal(*deal_id, actor)?;
                batch.activities_created = 1;
            }
            ManualAction::MergeDuplicates { keep_id, drop_id } => {
                executor.merge_duplicates(*keep_id, *drop_id, actor)?;
                batch.duplicates_found = 1;
                batch.last_offset = *keep_id;
            }
            ManualAction::MarkReviewed {
                activity_id,
                deal_id,
                decision,
            } => {
                executor.mark_reviewed(*activity_id, *deal_id, *decision, actor)?;
                batch.last_offset = *activity_id;
            }
        }

        self.db.record_batch(job_id, &batch)?;
        Ok(collect_result(job_id, ExecutionMode::Manual, vec![batch]))
    }

    fn execute_batches(
        &self,
        job_id: i64,
        mode: ExecutionMode,
        options: &ExecuteOptions,
    ) -> Result<BatchResult> {
        let batch_size = options.batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            return Err(Error::Validation("batch_size must be positive".into()));
        }
        let owner = options.owner.as_deref();
        let actor = options.actor.as_deref().unwrap_or(SYSTEM_ACTOR);
        let executor = ActionExecutor::new(&self.db);
        let generator = CandidateGenerator::new(&self.db, &self.config)?;

        // Duplicates are counted and surfaced, never auto-merged: a wrong
        // merge retires a record, which is too destructive for an automatic
        // pass. The count lands on the first batch, or on a trailing empty
        // batch when there are no orphans to walk.
        let detector = DuplicateDetector::new(&self.db, &self.config)?;
        let mut pending_duplicates = detector.find_duplicates(owner)?.len();

        let mut batches: Vec<BatchProgress> = Vec::new();
        let mut after_id = options.start_offset.unwrap_or(0);
        // Deals a dry run has already handed out; a real run gets the same
        // exclusivity from the executor's conflict check
        let mut claimed_deals: HashSet<i64> = HashSet::new();

        loop {
            if let Some(max) = options.max_batches {
                if batches.len() >= max {
                    break;
                }
            }
            let orphans = self.db.list_orphan_activities(owner, after_id, batch_size)?;
            if orphans.is_empty() {
                break;
            }

            let mut batch = BatchProgress {
                batch_index: batches.len(),
                duplicates_found: std::mem::take(&mut pending_duplicates),
                ..Default::default()
            };

            for activity in &orphans {
                batch.processed += 1;
                batch.last_offset = activity.id;

                // Per-candidate error isolation: a failure on one orphan is
                // recorded and the batch moves on
                match self.process_orphan(
                    &generator,
                    &executor,
                    mode,
                    actor,
                    activity,
                    &mut claimed_deals,
                    &mut batch,
                ) {
                    Ok(()) => {}
                    Err(e) => {
                        warn!(activity_id = activity.id, error = %e, "orphan processing failed");
                        batch.errors.push(format!("activity {}: {}", activity.id, e));
                    }
                }
            }

            after_id = batch.last_offset;
            self.db.record_batch(job_id, &batch)?;
            debug!(
                job_id,
                batch = batch.batch_index,
                processed = batch.processed,
                linked = batch.linked,
                "batch complete"
            );
            batches.push(batch);
        }

        // No orphans left the duplicate count homeless: record it on a final
        // empty batch so the job row and result still report it
        if pending_duplicates > 0 {
            let batch = BatchProgress {
                batch_index: batches.len(),
                duplicates_found: std::mem::take(&mut pending_duplicates),
                ..Default::default()
            };
            self.db.record_batch(job_id, &batch)?;
            batches.push(batch);
        }

        Ok(collect_result(job_id, mode, batches))
    }

    #[allow(clippy::too_many_arguments)]
    fn process_orphan(
        &self,
        generator: &CandidateGenerator<'_>,
        executor: &ActionExecutor<'_>,
        mode: ExecutionMode,
        actor: &str,
        activity: &crate::models::Activity,
        claimed_deals: &mut HashSet<i64>,
        batch: &mut BatchProgress,
    ) -> Result<()> {
        let candidates = generator.candidates_for_activity(activity)?;
        let best = match candidates.first() {
            Some(best) => best,
            None => {
                batch.unmatched += 1;
                return Ok(());
            }
        };

        let apply = match (mode, best.classification) {
            (_, Classification::Reject) => false,
            (ExecutionMode::Safe | ExecutionMode::DryRun, band) => {
                band == Classification::AutoLink
            }
            (ExecutionMode::Aggressive, Classification::AutoLink) => true,
            (ExecutionMode::Aggressive, Classification::NeedsReview) => {
                best.confidence >= self.config.aggressive_threshold
            }
            (ExecutionMode::Manual, _) => false,
        };
        if !apply {
            return Ok(());
        }

        if mode == ExecutionMode::DryRun {
            // Report what a safe run would do, touch nothing. A second orphan
            // pointing at an already-claimed deal would conflict-skip in a
            // real run, so it does not count as a would-link either.
            if claimed_deals.insert(best.deal_id) {
                batch.linked += 1;
            }
            return Ok(());
        }

        match executor.link(&LinkRequest {
            activity_id: best.activity_id,
            deal_id: best.deal_id,
            force: false,
            actor: actor.to_string(),
            confidence: Some(best.confidence),
        }) {
            Ok(LinkOutcome::Linked { .. }) => {
                batch.linked += 1;
                Ok(())
            }
            // Another pass got there first, or the deal was taken between
            // scoring and applying: benign skip, not an error
            Ok(LinkOutcome::AlreadyLinked) | Err(Error::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Progress for a specific job, or the most recent run when `job_id` is
    /// None
    pub fn progress(&self, job_id: Option<i64>) -> Result<Option<ProgressSnapshot>> {
        self.db.get_job(job_id)
    }

    /// Roll back a prior action. `confirm` must be true; rollback is the one
    /// operation the CLI refuses to run without an explicit yes.
    pub fn rollback(&self, action_id: i64, confirm: bool, actor: &str) -> Result<RollbackResult> {
        if !confirm {
            return Err(Error::Validation(
                "rollback requires explicit confirmation".into(),
            ));
        }
        ActionExecutor::new(&self.db).rollback(action_id, actor)
    }

    // Audit surface, read-only passthroughs

    pub fn recent_actions(&self, limit: usize) -> Result<Vec<ReconciliationAction>> {
        self.db.recent_actions(limit)
    }

    pub fn action_stats(&self) -> Result<Vec<ActionTypeStats>> {
        self.db.action_stats()
    }

    pub fn daily_metrics(&self, days: i64) -> Result<Vec<DailyMetric>> {
        self.db.daily_metrics(days)
    }

    pub fn check_integrity(&self) -> Result<Vec<IntegrityFinding>> {
        self.db.check_integrity()
    }
}

fn collect_result(job_id: i64, mode: ExecutionMode, batches: Vec<BatchProgress>) -> BatchResult {
    let mut result = BatchResult {
        job_id,
        mode,
        processed: 0,
        linked: 0,
        deals_created: 0,
        activities_created: 0,
        duplicates_found: 0,
        unmatched: 0,
        errors: Vec::new(),
        batches: Vec::new(),
    };
    for batch in &batches {
        result.processed += batch.processed;
        result.linked += batch.linked;
        result.deals_created += batch.deals_created;
        result.activities_created += batch.activities_created;
        result.duplicates_found += batch.duplicates_found;
        result.unmatched += batch.unmatched;
        result.errors.extend(batch.errors.iter().cloned());
    }
    result.batches = batches;
    result
}
