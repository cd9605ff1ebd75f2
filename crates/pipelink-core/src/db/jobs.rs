//! Batch job progress rows

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{BatchProgress, ExecutionMode, JobStatus, ProgressSnapshot};

const JOB_COLUMNS: &str = "id, mode, status, batches_completed, last_offset, processed, linked, \
     deals_created, activities_created, duplicates_found, error_count, started_at, finished_at";

fn map_job_row(row: &Row<'_>) -> rusqlite::Result<ProgressSnapshot> {
    let mode_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let started_str: String = row.get(11)?;
    let finished_str: Option<String> = row.get(12)?;

    Ok(ProgressSnapshot {
        job_id: row.get(0)?,
        mode: mode_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?,
        status: status_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        batches_completed: row.get(3)?,
        last_offset: row.get(4)?,
        processed: row.get(5)?,
        linked: row.get(6)?,
        deals_created: row.get(7)?,
        activities_created: row.get(8)?,
        duplicates_found: row.get(9)?,
        error_count: row.get(10)?,
        started_at: parse_datetime(&started_str),
        finished_at: finished_str.map(|s| parse_datetime(&s)),
    })
}

impl Database {
    /// Create a job row for a new execute() run
    pub fn create_job(&self, mode: ExecutionMode) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO recon_jobs (mode, status) VALUES (?, 'running')",
            params![mode.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Accumulate a completed batch onto the job row
    pub fn record_batch(&self, job_id: i64, batch: &BatchProgress) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE recon_jobs SET
                batches_completed = batches_completed + 1,
                last_offset = ?,
                processed = processed + ?,
                linked = linked + ?,
                deals_created = deals_created + ?,
                activities_created = activities_created + ?,
                duplicates_found = duplicates_found + ?,
                error_count = error_count + ?
            WHERE id = ?
            "#,
            params![
                batch.last_offset,
                batch.processed as i64,
                batch.linked as i64,
                batch.deals_created as i64,
                batch.activities_created as i64,
                batch.duplicates_found as i64,
                batch.errors.len() as i64,
                job_id,
            ],
        )?;
        Ok(())
    }

    /// Mark a job finished
    pub fn finish_job(&self, job_id: i64, status: JobStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE recon_jobs SET status = ?, finished_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), job_id],
        )?;
        Ok(())
    }

    /// Fetch a job by id, or the most recent job when `job_id` is None
    pub fn get_job(&self, job_id: Option<i64>) -> Result<Option<ProgressSnapshot>> {
        let conn = self.conn()?;
        let snapshot = match job_id {
            Some(id) => conn
                .query_row(
                    &format!("SELECT {} FROM recon_jobs WHERE id = ?", JOB_COLUMNS),
                    params![id],
                    map_job_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    &format!("SELECT {} FROM recon_jobs ORDER BY id DESC LIMIT 1", JOB_COLUMNS),
                    [],
                    map_job_row,
                )
                .optional()?,
        };
        Ok(snapshot)
    }
}
