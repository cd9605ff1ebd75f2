//! Domain models for Pipelink

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Actor recorded on actions performed by the engine itself (as opposed to a
/// human reviewer's user id)
pub const SYSTEM_ACTOR: &str = "system";

/// Activity types from the sales-logging surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Sale,
    Meeting,
    Outbound,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Meeting => "meeting",
            Self::Outbound => "outbound",
        }
    }
}

impl std::str::FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sale" => Ok(Self::Sale),
            "meeting" => Ok(Self::Meeting),
            "outbound" => Ok(Self::Outbound),
            _ => Err(format!("Unknown activity type: {}", s)),
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Activity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Completed,
    Planned,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Planned => "planned",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" | "done" => Ok(Self::Completed),
            "planned" | "open" => Ok(Self::Planned),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown activity status: {}", s)),
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A logged sales event. Created by the sales-logging surface; this engine
/// only ever sets/clears `linked_deal_id` and the `retired` flag (duplicate
/// merge), both through audited actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    /// Free-text client/company name as entered
    pub client_name: String,
    /// Canonical form used for matching (see `normalize`)
    pub client_name_normalized: String,
    pub amount: Option<f64>,
    pub activity_date: NaiveDate,
    pub user_id: String,
    pub linked_deal_id: Option<i64>,
    /// Set by duplicate merge; retired activities are excluded from matching
    pub retired: bool,
    pub created_at: DateTime<Utc>,
}

/// A new activity prior to insertion
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub client_name: String,
    pub amount: Option<f64>,
    pub activity_date: NaiveDate,
    pub user_id: String,
    /// Content hash for idempotent import; None for records created by the
    /// engine itself
    pub import_hash: Option<String>,
}

/// Pipeline deal stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStage {
    Won,
    Lost,
    Open,
}

impl DealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Open => "open",
        }
    }
}

impl std::str::FromStr for DealStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            "open" => Ok(Self::Open),
            _ => Err(format!("Unknown deal stage: {}", s)),
        }
    }
}

impl std::fmt::Display for DealStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pipeline opportunity. Lifecycle owned by the pipeline surface; this
/// engine reads deals and writes only `linked_activity_id` (plus deals it
/// derives itself via `create_deal_from_activity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: i64,
    pub company_name: String,
    pub company_name_normalized: String,
    pub stage: DealStage,
    /// Recurring component of the deal value (e.g. monthly fee)
    pub value_recurring: f64,
    /// One-off component of the deal value
    pub value_oneoff: f64,
    pub stage_changed_at: NaiveDate,
    pub user_id: String,
    pub linked_activity_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Deal {
    pub fn total_value(&self) -> f64 {
        self.value_recurring + self.value_oneoff
    }
}

/// A new deal prior to insertion
#[derive(Debug, Clone)]
pub struct NewDeal {
    pub company_name: String,
    pub stage: DealStage,
    pub value_recurring: f64,
    pub value_oneoff: f64,
    pub stage_changed_at: NaiveDate,
    pub user_id: String,
    pub import_hash: Option<String>,
}

/// Confidence band a scored pair falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AutoLink,
    NeedsReview,
    Reject,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoLink => "auto_link",
            Self::NeedsReview => "needs_review",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto_link" | "auto-link" | "auto" => Ok(Self::AutoLink),
            "needs_review" | "needs-review" | "review" => Ok(Self::NeedsReview),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Unknown classification: {}", s)),
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scored activity/deal pair. Ephemeral: generated fresh on every candidate
/// pass, never the system of record.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub activity_id: i64,
    pub deal_id: i64,
    pub name_score: f64,
    pub date_score: f64,
    pub amount_score: f64,
    pub confidence: f64,
    pub classification: Classification,
}

/// Two activities that likely describe one event logged twice
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateSuspect {
    /// The earlier-created record, kept on merge
    pub keep_id: i64,
    /// The later duplicate, retired on merge
    pub drop_id: i64,
    pub client_name_normalized: String,
    pub activity_date: NaiveDate,
    pub confidence: f64,
}

/// Reconciliation action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Link,
    CreateDeal,
    CreateActivity,
    MergeDuplicates,
    MarkReviewed,
    Rollback,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::CreateDeal => "create_deal",
            Self::CreateActivity => "create_activity",
            Self::MergeDuplicates => "merge_duplicates",
            Self::MarkReviewed => "mark_reviewed",
            Self::Rollback => "rollback",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "link" => Ok(Self::Link),
            "create_deal" => Ok(Self::CreateDeal),
            "create_activity" => Ok(Self::CreateActivity),
            "merge_duplicates" => Ok(Self::MergeDuplicates),
            "mark_reviewed" => Ok(Self::MarkReviewed),
            "rollback" => Ok(Self::Rollback),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human decision recorded by `mark_reviewed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Accept,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Unknown review decision: {}", s)),
        }
    }
}

/// Append-only record of a reconciliation action
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationAction {
    pub id: i64,
    pub action_type: ActionType,
    pub activity_id: Option<i64>,
    pub deal_id: Option<i64>,
    /// Drop side of a duplicate merge
    pub secondary_activity_id: Option<i64>,
    /// Match confidence at the time of an automatic action
    pub confidence: Option<f64>,
    /// `system` or a reviewer's user id
    pub actor: String,
    pub decision: Option<ReviewDecision>,
    /// JSON snapshot of the affected records before the mutation
    pub before_state: Option<String>,
    /// JSON snapshot of the affected records after the mutation
    pub after_state: Option<String>,
    pub rolled_back: bool,
    /// For rollback actions: the action being reversed
    pub rollback_of: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Full state of the records an action touched, captured before and after.
/// Serialized to JSON on the action row; rollback restores from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal: Option<Deal>,
    /// Second activity involved in a merge (the drop side) or displaced by a
    /// forced link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_activity: Option<Activity>,
    /// Deal displaced by a forced link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_deal: Option<Deal>,
}

/// Read-only summary returned by `analyze()`
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub total_activities: i64,
    pub total_deals: i64,
    pub linked_pairs: i64,
    pub orphan_activities: i64,
    pub orphan_deals: i64,
    pub duplicate_suspects: usize,
    pub auto_link_candidates: usize,
    pub needs_review_candidates: usize,
    pub unmatched_orphans: usize,
}

/// Execution mode for a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Score and report only, zero mutation
    DryRun,
    /// Auto-apply only `auto_link` classifications
    Safe,
    /// Also auto-apply `needs_review` above the secondary threshold
    Aggressive,
    /// Apply a single caller-specified action
    Manual,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Safe => "safe",
            Self::Aggressive => "aggressive",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dry_run" | "dry-run" | "dryrun" => Ok(Self::DryRun),
            "safe" => Ok(Self::Safe),
            "aggressive" => Ok(Self::Aggressive),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown execution mode: {}", s)),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single action payload for `manual` mode
#[derive(Debug, Clone)]
pub enum ManualAction {
    Link {
        activity_id: i64,
        deal_id: i64,
        force: bool,
    },
    CreateDeal {
        activity_id: i64,
    },
    CreateActivity {
        deal_id: i64,
    },
    MergeDuplicates {
        keep_id: i64,
        drop_id: i64,
    },
    MarkReviewed {
        activity_id: i64,
        deal_id: i64,
        decision: ReviewDecision,
    },
}

/// Options for `execute()`
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Batch size override (default from config, 500)
    pub batch_size: Option<usize>,
    /// Stop after this many batches
    pub max_batches: Option<usize>,
    /// Restrict the run to one owner's records
    pub owner: Option<String>,
    /// Resume: skip orphan activities with id <= this offset
    pub start_offset: Option<i64>,
    /// Actor recorded on actions (defaults to `system`)
    pub actor: Option<String>,
    /// Required for `manual` mode
    pub manual_action: Option<ManualAction>,
}

/// Per-batch progress counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchProgress {
    pub batch_index: usize,
    /// Highest orphan activity id processed in this batch
    pub last_offset: i64,
    pub processed: usize,
    pub linked: usize,
    pub deals_created: usize,
    pub activities_created: usize,
    pub duplicates_found: usize,
    pub unmatched: usize,
    pub errors: Vec<String>,
}

/// Result of a full `execute()` run
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub job_id: i64,
    pub mode: ExecutionMode,
    pub batches: Vec<BatchProgress>,
    pub processed: usize,
    pub linked: usize,
    pub deals_created: usize,
    pub activities_created: usize,
    pub duplicates_found: usize,
    pub unmatched: usize,
    pub errors: Vec<String>,
}

/// Status of a batch job row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Polling view over a batch job
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub job_id: i64,
    pub mode: ExecutionMode,
    pub status: JobStatus,
    pub batches_completed: i64,
    pub last_offset: i64,
    pub processed: i64,
    pub linked: i64,
    pub deals_created: i64,
    pub activities_created: i64,
    pub duplicates_found: i64,
    pub error_count: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Filter for `generate_candidates()`
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub owner: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Only return candidates in this confidence band
    pub band: Option<Classification>,
}

/// Result of a successful rollback
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    /// The action that was reversed
    pub action_id: i64,
    /// The new rollback action row
    pub rollback_action_id: i64,
}

/// Per-action-type counts over the action log
#[derive(Debug, Clone, Serialize)]
pub struct ActionTypeStats {
    pub action_type: ActionType,
    pub total: i64,
    pub rolled_back: i64,
    pub automatic: i64,
}

/// Daily action counts for the performance view
#[derive(Debug, Clone, Serialize)]
pub struct DailyMetric {
    pub day: String,
    pub total: i64,
    pub links: i64,
    pub creates: i64,
    pub rollbacks: i64,
}

/// A discovered invariant violation. Reported by the integrity sweep,
/// never auto-corrected.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityFinding {
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_enum_round_trips() {
        for t in [ActivityType::Sale, ActivityType::Meeting, ActivityType::Outbound] {
            assert_eq!(ActivityType::from_str(t.as_str()).unwrap(), t);
        }
        for s in [DealStage::Won, DealStage::Lost, DealStage::Open] {
            assert_eq!(DealStage::from_str(s.as_str()).unwrap(), s);
        }
        for a in [
            ActionType::Link,
            ActionType::CreateDeal,
            ActionType::CreateActivity,
            ActionType::MergeDuplicates,
            ActionType::MarkReviewed,
            ActionType::Rollback,
        ] {
            assert_eq!(ActionType::from_str(a.as_str()).unwrap(), a);
        }
    }

    #[test]
    fn test_execution_mode_aliases() {
        assert_eq!(ExecutionMode::from_str("dry-run").unwrap(), ExecutionMode::DryRun);
        assert_eq!(ExecutionMode::from_str("SAFE").unwrap(), ExecutionMode::Safe);
        assert!(ExecutionMode::from_str("yolo").is_err());
    }

    #[test]
    fn test_deal_total_value() {
        let deal = Deal {
            id: 1,
            company_name: "Acme".into(),
            company_name_normalized: "acme".into(),
            stage: DealStage::Won,
            value_recurring: 100.0,
            value_oneoff: 2500.0,
            stage_changed_at: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            user_id: "u1".into(),
            linked_activity_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(deal.total_value(), 2600.0);
    }

    #[test]
    fn test_pair_snapshot_omits_empty_sides() {
        let snap = PairSnapshot::default();
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, "{}");
    }
}
