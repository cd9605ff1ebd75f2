//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Database and job status

use std::path::Path;

use anyhow::{Context, Result};
use pipelink_core::Database;

/// Open the database, creating it (and its schema) if missing
pub fn open_db(db_path: &Path) -> Result<Database> {
    Database::new(&db_path.to_string_lossy()).context("Failed to open database")
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path)?;

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Import records: pipelink import --activities activities.csv --deals deals.csv");
    println!("  2. Preview matches: pipelink run --mode dry-run");
    println!("  3. Apply safe links: pipelink run --mode safe");

    Ok(())
}

pub fn cmd_status(db_path: &Path, job: Option<i64>) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Pipelink Status");
    println!("   ─────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
        println!();
        return Ok(());
    }

    let db = open_db(db_path)?;
    let (total_activities, orphan_activities, linked) = db.count_activities()?;
    let (total_deals, orphan_deals, _) = db.count_deals()?;

    println!();
    println!("   Activities: {} ({} orphans)", total_activities, orphan_activities);
    println!("   Deals: {} ({} won orphans)", total_deals, orphan_deals);
    println!("   Linked pairs: {}", linked);

    match db.get_job(job)? {
        Some(snapshot) => {
            println!();
            println!(
                "   Job #{}: {} ({})",
                snapshot.job_id,
                snapshot.mode.as_str(),
                snapshot.status.as_str()
            );
            println!(
                "      batches: {}  processed: {}  linked: {}  errors: {}",
                snapshot.batches_completed,
                snapshot.processed,
                snapshot.linked,
                snapshot.error_count
            );
            if snapshot.error_count > 0 || snapshot.status == pipelink_core::JobStatus::Failed {
                println!("      resume with: pipelink run --start-offset {}", snapshot.last_offset);
            }
        }
        None => {
            if job.is_some() {
                println!();
                println!("   ❌ No such job");
            }
        }
    }

    println!();
    Ok(())
}
