//! Pipelink CLI - Sales activity / pipeline deal reconciliation
//!
//! Usage:
//!   pipelink init                      Initialize database
//!   pipelink import --activities CSV   Import activity records
//!   pipelink run --mode safe           Run a reconciliation pass
//!   pipelink audit recent              Inspect the action log

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Import { activities, deals } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_import(&db, activities.as_deref(), deals.as_deref())
        }
        Commands::Analyze { owner, json } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_analyze(&db, owner.as_deref(), json)
        }
        Commands::Candidates {
            owner,
            band,
            limit,
            json,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_candidates(&db, owner.as_deref(), band.as_deref(), limit, json)
        }
        Commands::Run {
            mode,
            batch_size,
            max_batches,
            owner,
            start_offset,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_run(&db, &mode, batch_size, max_batches, owner, start_offset)
        }
        Commands::Link {
            activity_id,
            deal_id,
            force,
            actor,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_link(&db, activity_id, deal_id, force, actor.as_deref())
        }
        Commands::Merge {
            keep_id,
            drop_id,
            actor,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_merge(&db, keep_id, drop_id, actor.as_deref())
        }
        Commands::Review {
            activity_id,
            deal_id,
            decision,
            actor,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_review(&db, activity_id, deal_id, &decision, actor.as_deref())
        }
        Commands::Rollback {
            action_id,
            yes,
            actor,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_rollback(&db, action_id, yes, actor.as_deref())
        }
        Commands::Audit { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None => commands::cmd_audit_recent(&db, 20),
                Some(AuditAction::Recent { limit }) => commands::cmd_audit_recent(&db, limit),
                Some(AuditAction::Stats) => commands::cmd_audit_stats(&db),
                Some(AuditAction::Daily { days }) => commands::cmd_audit_daily(&db, days),
                Some(AuditAction::Integrity) => commands::cmd_audit_integrity(&db),
            }
        }
        Commands::Status { job } => commands::cmd_status(&cli.db, job),
    }
}
