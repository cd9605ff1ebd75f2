//! CSV import command

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use pipelink_core::{import_activities, import_deals, Database};

pub fn cmd_import(
    db: &Database,
    activities: Option<&Path>,
    deals: Option<&Path>,
) -> Result<()> {
    if activities.is_none() && deals.is_none() {
        bail!("Nothing to import: pass --activities and/or --deals");
    }

    if let Some(path) = activities {
        println!("📥 Importing activities from {}...", path.display());
        let file = File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let summary = import_activities(db, file)?;
        println!(
            "   {} imported, {} already present",
            summary.imported, summary.skipped
        );
    }

    if let Some(path) = deals {
        println!("📥 Importing deals from {}...", path.display());
        let file = File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let summary = import_deals(db, file)?;
        println!(
            "   {} imported, {} already present",
            summary.imported, summary.skipped
        );
    }

    println!("✅ Import complete. Run 'pipelink analyze' to see match candidates.");
    Ok(())
}
