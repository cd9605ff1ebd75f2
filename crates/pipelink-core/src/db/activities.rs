//! Activity operations

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Activity, NewActivity};
use crate::normalize::normalize_name;

/// Result of inserting an activity
#[derive(Debug, Clone)]
pub enum ActivityInsertResult {
    /// Activity was inserted, contains the new id
    Inserted(i64),
    /// Activity was a duplicate import, contains the existing id
    Duplicate(i64),
}

const ACTIVITY_COLUMNS: &str = "id, activity_type, status, client_name, client_name_normalized, \
     amount, activity_date, user_id, linked_deal_id, retired, created_at";

/// Map a SELECT over `ACTIVITY_COLUMNS` to an Activity
pub(crate) fn map_activity_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let date_str: String = row.get(6)?;
    let created_str: String = row.get(10)?;

    Ok(Activity {
        id: row.get(0)?,
        activity_type: type_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?,
        status: status_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        client_name: row.get(3)?,
        client_name_normalized: row.get(4)?,
        amount: row.get(5)?,
        activity_date: parse_date(&date_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })?,
        user_id: row.get(7)?,
        linked_deal_id: row.get(8)?,
        retired: row.get(9)?,
        created_at: parse_datetime(&created_str),
    })
}

/// Fetch one activity inside an existing connection/transaction
pub(crate) fn get_activity_conn(conn: &Connection, id: i64) -> Result<Option<Activity>> {
    let activity = conn
        .query_row(
            &format!("SELECT {} FROM activities WHERE id = ?", ACTIVITY_COLUMNS),
            params![id],
            map_activity_row,
        )
        .optional()?;
    Ok(activity)
}

impl Database {
    /// Insert an activity (skips duplicates based on import_hash)
    pub fn insert_activity(&self, activity: &NewActivity) -> Result<ActivityInsertResult> {
        let conn = self.conn()?;

        // Check-before-insert so the "already exists" path is an explicit,
        // named branch rather than implicit ON CONFLICT behavior
        if let Some(hash) = &activity.import_hash {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM activities WHERE import_hash = ?",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                return Ok(ActivityInsertResult::Duplicate(existing_id));
            }
        }

        conn.execute(
            r#"
            INSERT INTO activities (activity_type, status, client_name, client_name_normalized, amount, activity_date, user_id, import_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                activity.activity_type.as_str(),
                activity.status.as_str(),
                activity.client_name,
                normalize_name(&activity.client_name),
                activity.amount,
                activity.activity_date.to_string(),
                activity.user_id,
                activity.import_hash,
            ],
        )?;

        Ok(ActivityInsertResult::Inserted(conn.last_insert_rowid()))
    }

    /// Fetch one activity by id
    pub fn get_activity(&self, id: i64) -> Result<Option<Activity>> {
        let conn = self.conn()?;
        get_activity_conn(&conn, id)
    }

    /// List orphan activities (unlinked, not retired) with id > `after_id`,
    /// ordered by id. The id ordering is what lets batches partition into
    /// disjoint ranges and resume from an offset.
    pub fn list_orphan_activities(
        &self,
        owner: Option<&str>,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM activities
             WHERE linked_deal_id IS NULL AND retired = 0 AND id > ?",
            ACTIVITY_COLUMNS
        );
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(after_id)];

        if let Some(owner) = owner {
            sql.push_str(" AND user_id = ?");
            query_params.push(Box::new(owner.to_string()));
        }
        sql.push_str(" ORDER BY id LIMIT ?");
        query_params.push(Box::new(limit as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let activities = stmt
            .query_map(param_refs.as_slice(), map_activity_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activities)
    }

    /// Non-retired activities, optionally scoped to one owner. Used by the
    /// duplicate detector.
    pub fn list_active_activities(&self, owner: Option<&str>) -> Result<Vec<Activity>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM activities WHERE retired = 0",
            ACTIVITY_COLUMNS
        );
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(owner) = owner {
            sql.push_str(" AND user_id = ?");
            query_params.push(Box::new(owner.to_string()));
        }
        sql.push_str(" ORDER BY client_name_normalized, activity_date, id");

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let activities = stmt
            .query_map(param_refs.as_slice(), map_activity_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activities)
    }

    /// Unlinked, non-retired activities inside a date window around `date`,
    /// optionally owner-scoped. Candidate pool for an orphan deal.
    pub fn candidate_activities_for_deal(
        &self,
        date: chrono::NaiveDate,
        window_days: i64,
        owner: Option<&str>,
    ) -> Result<Vec<Activity>> {
        let conn = self.conn()?;

        let from = date - chrono::Duration::days(window_days);
        let to = date + chrono::Duration::days(window_days);

        let mut sql = format!(
            "SELECT {} FROM activities
             WHERE linked_deal_id IS NULL AND retired = 0
               AND activity_date BETWEEN ? AND ?",
            ACTIVITY_COLUMNS
        );
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(from.to_string()), Box::new(to.to_string())];
        if let Some(owner) = owner {
            sql.push_str(" AND user_id = ?");
            query_params.push(Box::new(owner.to_string()));
        }
        sql.push_str(" ORDER BY id");

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let activities = stmt
            .query_map(param_refs.as_slice(), map_activity_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activities)
    }

    /// Count activities, orphans, and linked pairs for the analysis report
    pub fn count_activities(&self) -> Result<(i64, i64, i64)> {
        let conn = self.conn()?;
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM activities WHERE retired = 0", [], |row| {
                row.get(0)
            })?;
        let orphans: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE retired = 0 AND linked_deal_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        let linked: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE retired = 0 AND linked_deal_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok((total, orphans, linked))
    }
}
