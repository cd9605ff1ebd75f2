//! Reconciliation action log
//!
//! Append-only. Action rows are written inside the same transaction as the
//! record mutation they describe, so the conn-level helpers here are what the
//! executor uses; the `Database` methods are the read-only query surface.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{ActionType, ActionTypeStats, DailyMetric, ReconciliationAction, SYSTEM_ACTOR};

/// A new action row, written by the executor
#[derive(Debug, Clone)]
pub(crate) struct NewAction {
    pub action_type: ActionType,
    pub activity_id: Option<i64>,
    pub deal_id: Option<i64>,
    pub secondary_activity_id: Option<i64>,
    pub confidence: Option<f64>,
    pub actor: String,
    pub decision: Option<&'static str>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
    pub rollback_of: Option<i64>,
}

impl NewAction {
    pub fn new(action_type: ActionType, actor: &str) -> Self {
        Self {
            action_type,
            activity_id: None,
            deal_id: None,
            secondary_activity_id: None,
            confidence: None,
            actor: if actor.is_empty() {
                SYSTEM_ACTOR.to_string()
            } else {
                actor.to_string()
            },
            decision: None,
            before_state: None,
            after_state: None,
            rollback_of: None,
        }
    }
}

const ACTION_COLUMNS: &str = "id, action_type, activity_id, deal_id, secondary_activity_id, \
     confidence, actor, decision, before_state, after_state, rolled_back, rollback_of, created_at";

fn map_action_row(row: &Row<'_>) -> rusqlite::Result<ReconciliationAction> {
    let type_str: String = row.get(1)?;
    let decision_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(12)?;

    Ok(ReconciliationAction {
        id: row.get(0)?,
        action_type: type_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?,
        activity_id: row.get(2)?,
        deal_id: row.get(3)?,
        secondary_activity_id: row.get(4)?,
        confidence: row.get(5)?,
        actor: row.get(6)?,
        decision: match decision_str {
            Some(s) => Some(s.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?),
            None => None,
        },
        before_state: row.get(8)?,
        after_state: row.get(9)?,
        rolled_back: row.get(10)?,
        rollback_of: row.get(11)?,
        created_at: parse_datetime(&created_str),
    })
}

/// Append an action row inside an existing transaction. Returns the new id.
pub(crate) fn insert_action_conn(conn: &Connection, action: &NewAction) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO reconciliation_actions
            (action_type, activity_id, deal_id, secondary_activity_id, confidence, actor, decision, before_state, after_state, rollback_of)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            action.action_type.as_str(),
            action.activity_id,
            action.deal_id,
            action.secondary_activity_id,
            action.confidence,
            action.actor,
            action.decision,
            action.before_state,
            action.after_state,
            action.rollback_of,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Flag an action rolled back inside an existing transaction. The row itself
/// is otherwise immutable; rollback is recorded as a new action.
pub(crate) fn mark_rolled_back_conn(conn: &Connection, action_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE reconciliation_actions SET rolled_back = 1 WHERE id = ?",
        params![action_id],
    )?;
    Ok(())
}

/// Fetch one action inside an existing connection/transaction
pub(crate) fn get_action_conn(conn: &Connection, id: i64) -> Result<Option<ReconciliationAction>> {
    let action = conn
        .query_row(
            &format!(
                "SELECT {} FROM reconciliation_actions WHERE id = ?",
                ACTION_COLUMNS
            ),
            params![id],
            map_action_row,
        )
        .optional()?;
    Ok(action)
}

impl Database {
    /// Fetch one action by id
    pub fn get_action(&self, id: i64) -> Result<Option<ReconciliationAction>> {
        let conn = self.conn()?;
        get_action_conn(&conn, id)
    }

    /// Most recent actions, newest first
    pub fn recent_actions(&self, limit: usize) -> Result<Vec<ReconciliationAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reconciliation_actions ORDER BY id DESC LIMIT ?",
            ACTION_COLUMNS
        ))?;
        let actions = stmt
            .query_map(params![limit as i64], map_action_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(actions)
    }

    /// Per-action-type counts over the whole log
    pub fn action_stats(&self) -> Result<Vec<ActionTypeStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT action_type,
                   COUNT(*) AS total,
                   SUM(CASE WHEN rolled_back = 1 THEN 1 ELSE 0 END) AS rolled_back,
                   SUM(CASE WHEN actor = 'system' THEN 1 ELSE 0 END) AS automatic
            FROM reconciliation_actions
            GROUP BY action_type
            ORDER BY total DESC
            "#,
        )?;
        let stats = stmt
            .query_map([], |row| {
                let type_str: String = row.get(0)?;
                Ok((
                    type_str,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        stats
            .into_iter()
            .map(|(type_str, total, rolled_back, automatic)| {
                let action_type: ActionType = type_str
                    .parse()
                    .map_err(crate::error::Error::Integrity)?;
                Ok(ActionTypeStats {
                    action_type,
                    total,
                    rolled_back,
                    automatic,
                })
            })
            .collect()
    }

    /// Daily action counts over the last `days` days, newest first
    pub fn daily_metrics(&self, days: i64) -> Result<Vec<DailyMetric>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DATE(created_at) AS day,
                   COUNT(*) AS total,
                   SUM(CASE WHEN action_type = 'link' THEN 1 ELSE 0 END) AS links,
                   SUM(CASE WHEN action_type IN ('create_deal', 'create_activity') THEN 1 ELSE 0 END) AS creates,
                   SUM(CASE WHEN action_type = 'rollback' THEN 1 ELSE 0 END) AS rollbacks
            FROM reconciliation_actions
            WHERE created_at >= DATETIME('now', ?)
            GROUP BY DATE(created_at)
            ORDER BY day DESC
            "#,
        )?;
        let metrics = stmt
            .query_map(params![format!("-{} days", days)], |row| {
                Ok(DailyMetric {
                    day: row.get(0)?,
                    total: row.get(1)?,
                    links: row.get(2)?,
                    creates: row.get(3)?,
                    rollbacks: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(metrics)
    }

    /// Pairs a human reviewed and rejected. Excluded from future candidate
    /// passes until the mark_reviewed action is rolled back.
    pub fn reviewed_rejected_pairs(&self) -> Result<HashSet<(i64, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT activity_id, deal_id FROM reconciliation_actions
             WHERE action_type = 'mark_reviewed' AND decision = 'reject' AND rolled_back = 0
               AND activity_id IS NOT NULL AND deal_id IS NOT NULL",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(pairs)
    }
}
