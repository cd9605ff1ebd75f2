//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pipelink - Reconcile logged sales activities with pipeline deals
#[derive(Parser)]
#[command(name = "pipelink")]
#[command(about = "Sales activity / pipeline deal reconciliation engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "pipelink.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import activity and/or deal records from CSV
    Import {
        /// Activities CSV (type,status,client_name,amount,date,user_id)
        #[arg(long)]
        activities: Option<PathBuf>,

        /// Deals CSV (company_name,stage,value_recurring,value_oneoff,stage_changed_at,user_id)
        #[arg(long)]
        deals: Option<PathBuf>,
    },

    /// Read-only analysis: orphans, candidate bands, duplicate suspects
    Analyze {
        /// Restrict to one owner's records
        #[arg(long)]
        owner: Option<String>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scored match candidates
    Candidates {
        /// Restrict to one owner's records
        #[arg(long)]
        owner: Option<String>,

        /// Confidence band: auto-link, needs-review, reject
        #[arg(long)]
        band: Option<String>,

        /// Maximum candidates to show
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Emit candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a reconciliation pass
    Run {
        /// Execution mode: dry-run, safe, aggressive
        #[arg(short, long, default_value = "dry-run")]
        mode: String,

        /// Orphans per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many batches
        #[arg(long)]
        max_batches: Option<usize>,

        /// Restrict the run to one owner's records
        #[arg(long)]
        owner: Option<String>,

        /// Resume from a previous run's last offset
        #[arg(long)]
        start_offset: Option<i64>,
    },

    /// Manually link an activity to a deal
    Link {
        /// Activity ID
        activity_id: i64,
        /// Deal ID
        deal_id: i64,

        /// Displace existing links on either side
        #[arg(long)]
        force: bool,

        /// Actor recorded on the action (defaults to "system")
        #[arg(long)]
        actor: Option<String>,
    },

    /// Merge two duplicate activities (keeps the first, retires the second)
    Merge {
        /// Activity ID to keep
        keep_id: i64,
        /// Activity ID to retire
        drop_id: i64,

        /// Actor recorded on the action
        #[arg(long)]
        actor: Option<String>,
    },

    /// Record a review decision for a candidate pair
    Review {
        /// Activity ID
        activity_id: i64,
        /// Deal ID
        deal_id: i64,

        /// Decision: accept or reject
        #[arg(long)]
        decision: String,

        /// Actor recorded on the action
        #[arg(long)]
        actor: Option<String>,
    },

    /// Roll back a prior reconciliation action
    Rollback {
        /// Action ID from the audit log
        action_id: i64,

        /// Confirm the rollback (required)
        #[arg(long)]
        yes: bool,

        /// Actor recorded on the rollback action
        #[arg(long)]
        actor: Option<String>,
    },

    /// Inspect the action log (recent, stats, daily, integrity)
    Audit {
        #[command(subcommand)]
        action: Option<AuditAction>,
    },

    /// Show database status and the latest job
    Status {
        /// Show a specific job instead of the latest
        #[arg(long)]
        job: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum AuditAction {
    /// Most recent actions
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Per-action-type counts
    Stats,

    /// Daily action counts
    Daily {
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Sweep the link columns for invariant violations
    Integrity,
}
