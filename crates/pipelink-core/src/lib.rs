//! Pipelink Core Library
//!
//! Reconciliation engine for sales activities and pipeline deals:
//! - Database access and migrations (embedded SQLite)
//! - CSV importers for activity and deal exports
//! - Name normalization and three-factor similarity scoring
//! - Confidence engine with auto-link / needs-review / reject bands
//! - Candidate generation and duplicate detection
//! - Transactional action executor with full audit snapshots and rollback
//! - Batch orchestrator with resumable, per-batch progress

pub mod batch;
pub mod candidates;
pub mod confidence;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod executor;
pub mod import;
pub mod models;
pub mod normalize;
pub mod similarity;

pub use batch::Reconciler;
pub use candidates::CandidateGenerator;
pub use confidence::{ConfidenceEngine, ConfidenceThresholds, ScoringWeights};
pub use config::ReconcilerConfig;
pub use db::{ActivityInsertResult, Database, DealInsertResult};
pub use duplicates::DuplicateDetector;
pub use error::{Error, Result};
pub use executor::{ActionExecutor, LinkOutcome, LinkRequest};
pub use import::{import_activities, import_deals, ImportSummary};
pub use models::{
    ActionType, Activity, ActivityStatus, ActivityType, AnalysisReport, BatchProgress,
    BatchResult, CandidateFilter, Classification, DailyMetric, Deal, DealStage, DuplicateSuspect,
    ExecuteOptions, ExecutionMode, IntegrityFinding, JobStatus, ManualAction, MatchCandidate,
    NewActivity, NewDeal, ProgressSnapshot, ReconciliationAction, ReviewDecision, RollbackResult,
};
pub use normalize::normalize_name;
