//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - init/status commands and the shared `open_db` utility
//! - `import` - CSV import command
//! - `analyze` - Read-only analysis and candidate listing
//! - `run` - Reconciliation runs and the manual actions (link, merge,
//!   review, rollback)
//! - `audit` - Action log queries and the integrity sweep

pub mod analyze;
pub mod audit;
pub mod core;
pub mod import;
pub mod run;

// Re-export command functions for main.rs
pub use analyze::*;
pub use audit::*;
pub use core::*;
pub use import::*;
pub use run::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        // Back off to a char boundary; names are free text and may be
        // multi-byte UTF-8
        let mut cut = max.saturating_sub(3);
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}
