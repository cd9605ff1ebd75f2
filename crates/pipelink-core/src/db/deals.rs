//! Deal operations

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Deal, NewDeal};
use crate::normalize::normalize_name;

/// Result of inserting a deal
#[derive(Debug, Clone)]
pub enum DealInsertResult {
    Inserted(i64),
    Duplicate(i64),
}

const DEAL_COLUMNS: &str = "id, company_name, company_name_normalized, stage, value_recurring, \
     value_oneoff, stage_changed_at, user_id, linked_activity_id, created_at";

/// Map a SELECT over `DEAL_COLUMNS` to a Deal
pub(crate) fn map_deal_row(row: &Row<'_>) -> rusqlite::Result<Deal> {
    let stage_str: String = row.get(3)?;
    let date_str: String = row.get(6)?;
    let created_str: String = row.get(9)?;

    Ok(Deal {
        id: row.get(0)?,
        company_name: row.get(1)?,
        company_name_normalized: row.get(2)?,
        stage: stage_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        value_recurring: row.get(4)?,
        value_oneoff: row.get(5)?,
        stage_changed_at: parse_date(&date_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })?,
        user_id: row.get(7)?,
        linked_activity_id: row.get(8)?,
        created_at: parse_datetime(&created_str),
    })
}

/// Fetch one deal inside an existing connection/transaction
pub(crate) fn get_deal_conn(conn: &Connection, id: i64) -> Result<Option<Deal>> {
    let deal = conn
        .query_row(
            &format!("SELECT {} FROM deals WHERE id = ?", DEAL_COLUMNS),
            params![id],
            map_deal_row,
        )
        .optional()?;
    Ok(deal)
}

impl Database {
    /// Insert a deal (skips duplicates based on import_hash)
    pub fn insert_deal(&self, deal: &NewDeal) -> Result<DealInsertResult> {
        let conn = self.conn()?;

        if let Some(hash) = &deal.import_hash {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM deals WHERE import_hash = ?",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                return Ok(DealInsertResult::Duplicate(existing_id));
            }
        }

        conn.execute(
            r#"
            INSERT INTO deals (company_name, company_name_normalized, stage, value_recurring, value_oneoff, stage_changed_at, user_id, import_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                deal.company_name,
                normalize_name(&deal.company_name),
                deal.stage.as_str(),
                deal.value_recurring,
                deal.value_oneoff,
                deal.stage_changed_at.to_string(),
                deal.user_id,
                deal.import_hash,
            ],
        )?;

        Ok(DealInsertResult::Inserted(conn.last_insert_rowid()))
    }

    /// Fetch one deal by id
    pub fn get_deal(&self, id: i64) -> Result<Option<Deal>> {
        let conn = self.conn()?;
        get_deal_conn(&conn, id)
    }

    /// Orphan deals: stage `won`, no linked activity. Ordered by id for
    /// batch partitioning.
    pub fn list_orphan_deals(
        &self,
        owner: Option<&str>,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Deal>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM deals
             WHERE linked_activity_id IS NULL AND stage = 'won' AND id > ?",
            DEAL_COLUMNS
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
        let deals = stmt
            .query_map(param_refs.as_slice(), map_deal_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deals)
    }

    /// Unlinked won/open deals whose stage-change date falls inside a window
    /// around `date`, optionally owner-scoped. Candidate pool for an orphan
    /// activity.
    pub fn candidate_deals_for_activity(
        &self,
        date: chrono::NaiveDate,
        window_days: i64,
        owner: Option<&str>,
    ) -> Result<Vec<Deal>> {
        let conn = self.conn()?;

        let from = date - chrono::Duration::days(window_days);
        let to = date + chrono::Duration::days(window_days);

        let mut sql = format!(
            "SELECT {} FROM deals
             WHERE linked_activity_id IS NULL
               AND stage IN ('won', 'open')
               AND stage_changed_at BETWEEN ? AND ?",
            DEAL_COLUMNS
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
        let deals = stmt
            .query_map(param_refs.as_slice(), map_deal_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deals)
    }

    /// Count deals, won orphans, and linked deals for the analysis report
    pub fn count_deals(&self) -> Result<(i64, i64, i64)> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM deals", [], |row| row.get(0))?;
        let orphans: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deals WHERE stage = 'won' AND linked_activity_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        let linked: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deals WHERE linked_activity_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok((total, orphans, linked))
    }
}
