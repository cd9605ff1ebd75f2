//! Reconciliation runs and manual actions

use anyhow::{bail, Context, Result};
use tracing::debug;
use pipelink_core::{
    Database, ExecuteOptions, ExecutionMode, ManualAction, Reconciler, ReconcilerConfig,
    ReviewDecision,
};

pub fn cmd_run(
    db: &Database,
    mode: &str,
    batch_size: Option<usize>,
    max_batches: Option<usize>,
    owner: Option<String>,
    start_offset: Option<i64>,
) -> Result<()> {
    let mode: ExecutionMode = mode
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid mode (expected dry-run, safe, or aggressive)")?;
    if mode == ExecutionMode::Manual {
        bail!("Manual actions have their own commands: link, merge, review");
    }

    println!("⚙️  Running reconciliation ({} mode)...", mode.as_str());

    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    let result = reconciler.execute(
        mode,
        &ExecuteOptions {
            batch_size,
            max_batches,
            owner,
            start_offset,
            ..Default::default()
        },
    )?;

    debug!(job_id = result.job_id, batches = result.batches.len(), "run finished");

    println!();
    println!("📊 Run #{} Results ({} batches)", result.job_id, result.batches.len());
    println!("   ─────────────────────────────");
    println!("   Orphans processed: {}", result.processed);
    if mode == ExecutionMode::DryRun {
        println!("   🔗 Would link: {}", result.linked);
    } else {
        println!("   🔗 Linked: {}", result.linked);
    }
    println!("   👯 Duplicate suspects: {}", result.duplicates_found);
    println!("   ❓ Unmatched: {}", result.unmatched);

    if !result.errors.is_empty() {
        println!();
        println!("⚠️  {} errors:", result.errors.len());
        for error in result.errors.iter().take(10) {
            println!("   {}", error);
        }
        if result.errors.len() > 10 {
            println!("   ... and {} more", result.errors.len() - 10);
        }
    }

    if result.duplicates_found > 0 {
        println!();
        println!("   Duplicates are never merged automatically.");
        println!("   Inspect with 'pipelink analyze', merge with 'pipelink merge KEEP DROP'.");
    }
    println!();
    Ok(())
}

pub fn cmd_link(
    db: &Database,
    activity_id: i64,
    deal_id: i64,
    force: bool,
    actor: Option<&str>,
) -> Result<()> {
    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    let result = reconciler.execute(
        ExecutionMode::Manual,
        &ExecuteOptions {
            actor: actor.map(str::to_string),
            manual_action: Some(ManualAction::Link {
                activity_id,
                deal_id,
                force,
            }),
            ..Default::default()
        },
    )?;

    if result.linked == 1 {
        println!("🔗 Linked activity {} to deal {}.", activity_id, deal_id);
    } else {
        println!(
            "Activity {} and deal {} were already linked; nothing to do.",
            activity_id, deal_id
        );
    }
    Ok(())
}

pub fn cmd_merge(db: &Database, keep_id: i64, drop_id: i64, actor: Option<&str>) -> Result<()> {
    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    reconciler.execute(
        ExecutionMode::Manual,
        &ExecuteOptions {
            actor: actor.map(str::to_string),
            manual_action: Some(ManualAction::MergeDuplicates { keep_id, drop_id }),
            ..Default::default()
        },
    )?;

    println!(
        "👯 Merged: activity {} kept, activity {} retired.",
        keep_id, drop_id
    );
    Ok(())
}

pub fn cmd_review(
    db: &Database,
    activity_id: i64,
    deal_id: i64,
    decision: &str,
    actor: Option<&str>,
) -> Result<()> {
    let decision: ReviewDecision = decision
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid decision (expected accept or reject)")?;

    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    reconciler.execute(
        ExecutionMode::Manual,
        &ExecuteOptions {
            actor: actor.map(str::to_string),
            manual_action: Some(ManualAction::MarkReviewed {
                activity_id,
                deal_id,
                decision,
            }),
            ..Default::default()
        },
    )?;

    println!(
        "📝 Recorded {} for activity {} / deal {}.",
        decision.as_str(),
        activity_id,
        deal_id
    );
    if decision == ReviewDecision::Reject {
        println!("   The pair will not be proposed again.");
    }
    Ok(())
}

pub fn cmd_rollback(db: &Database, action_id: i64, yes: bool, actor: Option<&str>) -> Result<()> {
    if !yes {
        bail!("Rollback requires --yes (check the action first with 'pipelink audit recent')");
    }

    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    let result = reconciler.rollback(
        action_id,
        true,
        actor.unwrap_or(pipelink_core::models::SYSTEM_ACTOR),
    )?;

    println!(
        "↩️  Rolled back action {} (rollback recorded as action {}).",
        result.action_id, result.rollback_action_id
    );
    Ok(())
}
