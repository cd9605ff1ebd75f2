//! Read-only analysis commands

use anyhow::{Context, Result};
use pipelink_core::{
    CandidateFilter, Classification, Database, Reconciler, ReconcilerConfig,
};

use super::truncate;

pub fn cmd_analyze(db: &Database, owner: Option<&str>, json: bool) -> Result<()> {
    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    let report = reconciler.analyze(owner)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("🔎 Reconciliation Analysis");
    println!("   ─────────────────────────────────────────────");
    println!("   Activities: {}", report.total_activities);
    println!("   Deals: {}", report.total_deals);
    println!("   Linked pairs: {}", report.linked_pairs);
    println!();
    println!("   Orphan activities: {}", report.orphan_activities);
    println!("   Orphan won deals: {}", report.orphan_deals);
    println!();
    println!("   🔗 Auto-link candidates: {}", report.auto_link_candidates);
    println!("   👀 Needs-review candidates: {}", report.needs_review_candidates);
    println!("   👯 Duplicate suspects: {}", report.duplicate_suspects);
    println!("   ❓ Unmatched orphans: {}", report.unmatched_orphans);

    if report.auto_link_candidates > 0 {
        println!();
        println!(
            "   Run 'pipelink run --mode safe' to apply the {} auto-link candidates.",
            report.auto_link_candidates
        );
    }
    println!();
    Ok(())
}

pub fn cmd_candidates(
    db: &Database,
    owner: Option<&str>,
    band: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let band = band
        .map(|s| {
            s.parse::<Classification>()
                .map_err(anyhow::Error::msg)
                .context("Invalid band (expected auto-link, needs-review, or reject)")
        })
        .transpose()?;

    let reconciler = Reconciler::new(db.clone(), ReconcilerConfig::default())?;
    let mut candidates = reconciler.generate_candidates(&CandidateFilter {
        owner: owner.map(str::to_string),
        band,
        ..Default::default()
    })?;
    candidates.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    if candidates.is_empty() {
        println!("No match candidates found.");
        return Ok(());
    }

    println!();
    println!(
        "   {:>8} {:>8} {:>6} {:>6} {:>6} {:>6}  {:<12} {}",
        "activity", "deal", "conf", "name", "date", "amt", "band", "client"
    );
    println!("   ─────────────────────────────────────────────────────────────────");
    for c in &candidates {
        let client = db
            .get_activity(c.activity_id)?
            .map(|a| a.client_name)
            .unwrap_or_default();
        println!(
            "   {:>8} {:>8} {:>6.1} {:>6.1} {:>6.1} {:>6.1}  {:<12} {}",
            c.activity_id,
            c.deal_id,
            c.confidence,
            c.name_score,
            c.date_score,
            c.amount_score,
            c.classification.as_str(),
            truncate(&client, 30),
        );
    }
    println!();
    println!(
        "   Link one with: pipelink link ACTIVITY DEAL   Reject with: pipelink review ACTIVITY DEAL --decision reject"
    );
    println!();
    Ok(())
}
