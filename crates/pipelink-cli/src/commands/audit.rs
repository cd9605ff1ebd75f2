//! Action log queries and the integrity sweep

use anyhow::Result;
use pipelink_core::Database;

pub fn cmd_audit_recent(db: &Database, limit: usize) -> Result<()> {
    let actions = db.recent_actions(limit)?;
    if actions.is_empty() {
        println!("No reconciliation actions recorded yet.");
        return Ok(());
    }

    println!();
    println!(
        "   {:>6} {:<17} {:>8} {:>8} {:>6}  {:<20} {}",
        "id", "action", "activity", "deal", "conf", "actor", "when"
    );
    println!("   ──────────────────────────────────────────────────────────────────────────");
    for action in &actions {
        let confidence = action
            .confidence
            .map(|c| format!("{:.1}", c))
            .unwrap_or_else(|| "-".to_string());
        let flags = if action.rolled_back { " (rolled back)" } else { "" };
        println!(
            "   {:>6} {:<17} {:>8} {:>8} {:>6}  {:<20} {}{}",
            action.id,
            action.action_type.as_str(),
            action.activity_id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
            action.deal_id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
            confidence,
            super::truncate(&action.actor, 20),
            action.created_at.format("%Y-%m-%d %H:%M"),
            flags,
        );
    }
    println!();
    Ok(())
}

pub fn cmd_audit_stats(db: &Database) -> Result<()> {
    let stats = db.action_stats()?;
    if stats.is_empty() {
        println!("No reconciliation actions recorded yet.");
        return Ok(());
    }

    println!();
    println!(
        "   {:<17} {:>7} {:>10} {:>12}",
        "action", "total", "automatic", "rolled back"
    );
    println!("   ────────────────────────────────────────────────");
    for s in &stats {
        println!(
            "   {:<17} {:>7} {:>10} {:>12}",
            s.action_type.as_str(),
            s.total,
            s.automatic,
            s.rolled_back
        );
    }
    println!();
    Ok(())
}

pub fn cmd_audit_daily(db: &Database, days: i64) -> Result<()> {
    let metrics = db.daily_metrics(days)?;
    if metrics.is_empty() {
        println!("No reconciliation actions in the last {} days.", days);
        return Ok(());
    }

    println!();
    println!(
        "   {:<12} {:>7} {:>7} {:>8} {:>10}",
        "day", "total", "links", "creates", "rollbacks"
    );
    println!("   ─────────────────────────────────────────────────");
    for m in &metrics {
        println!(
            "   {:<12} {:>7} {:>7} {:>8} {:>10}",
            m.day, m.total, m.links, m.creates, m.rollbacks
        );
    }
    println!();
    Ok(())
}

pub fn cmd_audit_integrity(db: &Database) -> Result<()> {
    let findings = db.check_integrity()?;
    if findings.is_empty() {
        println!("✅ No integrity violations found.");
        return Ok(());
    }

    println!("⚠️  {} integrity violation(s):", findings.len());
    for finding in &findings {
        println!("   {}", finding.description);
    }
    println!();
    println!("   These are surfaced for inspection, never auto-corrected.");
    Ok(())
}
