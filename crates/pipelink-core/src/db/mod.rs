//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `activities` - Sales activity reads/writes
//! - `deals` - Pipeline deal reads/writes
//! - `actions` - Append-only reconciliation action log and its query surface
//! - `jobs` - Batch job progress rows

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::IntegrityFinding;

mod actions;
mod activities;
mod deals;
mod jobs;

pub use activities::ActivityInsertResult;
pub use deals::DealInsertResult;

pub(crate) use actions::{
    get_action_conn, insert_action_conn, mark_rolled_back_conn, NewAction,
};
pub(crate) use activities::get_activity_conn;
pub(crate) use deals::get_deal_conn;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
///
/// SQLite stores CURRENT_TIMESTAMP as "YYYY-MM-DD HH:MM:SS".
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a SQLite date string ("YYYY-MM-DD") into a NaiveDate
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::Integrity(format!("bad date value '{}': {}", s, e)))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) a database at the given path and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database for testing
    ///
    /// Uses a temp file rather than `:memory:` so every pooled connection
    /// sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/pipelink_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for grouping queries)
            PRAGMA temp_store = MEMORY;

            -- Sales activities (logged calls, meetings, completed sales).
            -- Created by the sales-logging surface; this engine only sets
            -- linked_deal_id and retired, both through audited actions.
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY,
                activity_type TEXT NOT NULL,
                status TEXT NOT NULL,
                client_name TEXT NOT NULL,
                client_name_normalized TEXT NOT NULL,
                amount REAL,
                activity_date DATE NOT NULL,
                user_id TEXT NOT NULL,
                linked_deal_id INTEGER UNIQUE REFERENCES deals(id),
                retired BOOLEAN NOT NULL DEFAULT 0,
                import_hash TEXT UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_activities_normalized ON activities(client_name_normalized);
            CREATE INDEX IF NOT EXISTS idx_activities_date ON activities(activity_date);
            CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id);
            CREATE INDEX IF NOT EXISTS idx_activities_retired ON activities(retired);

            -- Pipeline deals. Lifecycle owned by the pipeline surface; this
            -- engine reads deals and writes linked_activity_id.
            CREATE TABLE IF NOT EXISTS deals (
                id INTEGER PRIMARY KEY,
                company_name TEXT NOT NULL,
                company_name_normalized TEXT NOT NULL,
                stage TEXT NOT NULL,
                value_recurring REAL NOT NULL DEFAULT 0,
                value_oneoff REAL NOT NULL DEFAULT 0,
                stage_changed_at DATE NOT NULL,
                user_id TEXT NOT NULL,
                linked_activity_id INTEGER UNIQUE REFERENCES activities(id),
                import_hash TEXT UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_deals_normalized ON deals(company_name_normalized);
            CREATE INDEX IF NOT EXISTS idx_deals_stage ON deals(stage);
            CREATE INDEX IF NOT EXISTS idx_deals_stage_changed ON deals(stage_changed_at);
            CREATE INDEX IF NOT EXISTS idx_deals_user ON deals(user_id);

            -- Reconciliation action log (append-only). Every mutation this
            -- engine performs writes exactly one row here, in the same
            -- transaction as the mutation itself.
            CREATE TABLE IF NOT EXISTS reconciliation_actions (
                id INTEGER PRIMARY KEY,
                action_type TEXT NOT NULL,
                activity_id INTEGER,
                deal_id INTEGER,
                secondary_activity_id INTEGER,
                confidence REAL,
                actor TEXT NOT NULL,
                decision TEXT,
                before_state TEXT,
                after_state TEXT,
                rolled_back BOOLEAN NOT NULL DEFAULT 0,
                rollback_of INTEGER REFERENCES reconciliation_actions(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_actions_type ON reconciliation_actions(action_type);
            CREATE INDEX IF NOT EXISTS idx_actions_timestamp ON reconciliation_actions(created_at);
            CREATE INDEX IF NOT EXISTS idx_actions_activity ON reconciliation_actions(activity_id);
            CREATE INDEX IF NOT EXISTS idx_actions_deal ON reconciliation_actions(deal_id);

            -- Batch job progress, one row per execute() run
            CREATE TABLE IF NOT EXISTS recon_jobs (
                id INTEGER PRIMARY KEY,
                mode TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                batches_completed INTEGER NOT NULL DEFAULT 0,
                last_offset INTEGER NOT NULL DEFAULT 0,
                processed INTEGER NOT NULL DEFAULT 0,
                linked INTEGER NOT NULL DEFAULT 0,
                deals_created INTEGER NOT NULL DEFAULT 0,
                activities_created INTEGER NOT NULL DEFAULT 0,
                duplicates_found INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                finished_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_recon_jobs_status ON recon_jobs(status);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Sweep for invariant violations in the link columns.
    ///
    /// Findings are surfaced for operator attention, never auto-corrected.
    pub fn check_integrity(&self) -> Result<Vec<IntegrityFinding>> {
        let conn = self.conn()?;
        let mut findings = Vec::new();

        // Link columns pointing at records that don't exist
        let mut stmt = conn.prepare(
            "SELECT a.id, a.linked_deal_id FROM activities a
             LEFT JOIN deals d ON d.id = a.linked_deal_id
             WHERE a.linked_deal_id IS NOT NULL AND d.id IS NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (activity_id, deal_id) = row?;
            findings.push(IntegrityFinding {
                description: format!(
                    "activity {} links to missing deal {}",
                    activity_id, deal_id
                ),
            });
        }

        let mut stmt = conn.prepare(
            "SELECT d.id, d.linked_activity_id FROM deals d
             LEFT JOIN activities a ON a.id = d.linked_activity_id
             WHERE d.linked_activity_id IS NOT NULL AND a.id IS NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (deal_id, activity_id) = row?;
            findings.push(IntegrityFinding {
                description: format!(
                    "deal {} links to missing activity {}",
                    deal_id, activity_id
                ),
            });
        }

        // Asymmetric links: each side of a 1:1 link must point back
        let mut stmt = conn.prepare(
            "SELECT a.id, a.linked_deal_id FROM activities a
             JOIN deals d ON d.id = a.linked_deal_id
             WHERE d.linked_activity_id IS NOT a.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (activity_id, deal_id) = row?;
            findings.push(IntegrityFinding {
                description: format!(
                    "asymmetric link: activity {} points at deal {} but the deal does not point back",
                    activity_id, deal_id
                ),
            });
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests;
