//! Action executor
//!
//! Applies the reconciliation actions: link, create-deal-from-activity,
//! create-activity-from-deal, merge-duplicates, mark-reviewed, rollback.
//!
//! Every mutating operation runs inside a single IMMEDIATE transaction so the
//! record mutation and its action-log row either both commit or both roll
//! back. There is no state where a link exists without an audit entry.
//! SQLite's write transaction is the row-lock equivalent here: a concurrent
//! attempt re-reads inside its own transaction and observes the row already
//! linked.

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::info;

use crate::db::{
    get_action_conn, get_activity_conn, get_deal_conn, insert_action_conn, mark_rolled_back_conn,
    Database, NewAction,
};
use crate::error::{Error, Result};
use crate::models::{
    ActionType, Activity, ActivityStatus, ActivityType, Deal, DealStage, PairSnapshot,
    ReviewDecision, RollbackResult,
};
use crate::normalize::normalize_name;

/// Outcome of a `link` call
#[derive(Debug, Clone)]
pub enum LinkOutcome {
    /// The pair was linked; contains the logged action id
    Linked { action_id: i64 },
    /// The exact pair was already linked. Benign skip on retry; no new
    /// action row is written.
    AlreadyLinked,
}

/// Parameters for a `link` call
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub activity_id: i64,
    pub deal_id: i64,
    /// Human-reviewer override: displace existing links on either side
    pub force: bool,
    pub actor: String,
    /// Match confidence when the link is automatic
    pub confidence: Option<f64>,
}

/// Executor over the record store
pub struct ActionExecutor<'a> {
    db: &'a Database,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Link an activity and a deal (1:1, both directions).
    ///
    /// Fails with `Conflict` if either side is linked elsewhere, unless
    /// `force` is set, in which case existing links are cleared first and the
    /// displaced partners are captured in the before-snapshot.
    pub fn link(&self, request: &LinkRequest) -> Result<LinkOutcome> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let activity = get_activity_conn(&tx, request.activity_id)?.ok_or_else(|| {
            Error::NotFound(format!("activity {}", request.activity_id))
        })?;
        let deal = get_deal_conn(&tx, request.deal_id)?
            .ok_or_else(|| Error::NotFound(format!("deal {}", request.deal_id)))?;

        if activity.retired {
            return Err(Error::Validation(format!(
                "activity {} is retired",
                activity.id
            )));
        }

        // Idempotent retry: the pair is already linked, nothing to do
        if activity.linked_deal_id == Some(deal.id) && deal.linked_activity_id == Some(activity.id)
        {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        // Half-linked pairs mean the 1:1 invariant is already broken
        if activity.linked_deal_id == Some(deal.id) || deal.linked_activity_id == Some(activity.id)
        {
            return Err(Error::Integrity(format!(
                "asymmetric link between activity {} and deal {}",
                activity.id, deal.id
            )));
        }

        let mut before = PairSnapshot {
            activity: Some(activity.clone()),
            deal: Some(deal.clone()),
            ..Default::default()
        };

        if activity.linked_deal_id.is_some() || deal.linked_activity_id.is_some() {
            if !request.force {
                return Err(Error::Conflict(format!(
                    "activity {} or deal {} is already linked",
                    activity.id, deal.id
                )));
            }
            // Force: displace the existing partners, capturing them so a
            // single rollback restores the pre-force topology
            if let Some(other_deal_id) = activity.linked_deal_id {
                before.secondary_deal = get_deal_conn(&tx, other_deal_id)?;
                set_deal_link(&tx, other_deal_id, None)?;
                set_activity_link(&tx, activity.id, None)?;
            }
            if let Some(other_activity_id) = deal.linked_activity_id {
                before.secondary_activity = get_activity_conn(&tx, other_activity_id)?;
                set_activity_link(&tx, other_activity_id, None)?;
                set_deal_link(&tx, deal.id, None)?;
            }
        }

        set_activity_link(&tx, activity.id, Some(deal.id))?;
        set_deal_link(&tx, deal.id, Some(activity.id))?;

        let after = PairSnapshot {
            activity: get_activity_conn(&tx, activity.id)?,
            deal: get_deal_conn(&tx, deal.id)?,
            secondary_activity: match &before.secondary_activity {
                Some(a) => get_activity_conn(&tx, a.id)?,
                None => None,
            },
            secondary_deal: match &before.secondary_deal {
                Some(d) => get_deal_conn(&tx, d.id)?,
                None => None,
            },
        };

        let action_id = insert_action_conn(
            &tx,
            &NewAction {
                activity_id: Some(activity.id),
                deal_id: Some(deal.id),
                confidence: request.confidence,
                before_state: Some(serde_json::to_string(&before)?),
                after_state: Some(serde_json::to_string(&after)?),
                ..NewAction::new(ActionType::Link, &request.actor)
            },
        )?;

        tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
        info!(
            activity_id = activity.id,
            deal_id = deal.id,
            action_id,
            force = request.force,
            "linked activity to deal"
        );
        Ok(LinkOutcome::Linked { action_id })
    }

    /// Derive a deal from an orphan activity, link it, and log the action.
    ///
    /// `Conflict` if the activity is already linked; that check is what makes
    /// a blind retry safe (the second call finds the link and creates
    /// nothing).
    pub fn create_deal_from_activity(&self, activity_id: i64, actor: &str) -> Result<(i64, i64)> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let activity = get_activity_conn(&tx, activity_id)?
            .ok_or_else(|| Error::NotFound(format!("activity {}", activity_id)))?;
        if activity.retired {
            return Err(Error::Validation(format!(
                "activity {} is retired",
                activity.id
            )));
        }
        if activity.linked_deal_id.is_some() {
            return Err(Error::Conflict(format!(
                "activity {} is already linked",
                activity.id
            )));
        }

        let before = PairSnapshot {
            activity: Some(activity.clone()),
            ..Default::default()
        };

        tx.execute(
            r#"
            INSERT INTO deals (company_name, company_name_normalized, stage, value_recurring, value_oneoff, stage_changed_at, user_id)
            VALUES (?, ?, ?, 0, ?, ?, ?)
            "#,
            params![
                activity.client_name,
                normalize_name(&activity.client_name),
                stage_for_status(activity.status).as_str(),
                activity.amount.unwrap_or(0.0),
                activity.activity_date.to_string(),
                activity.user_id,
            ],
        )?;
        let deal_id = tx.last_insert_rowid();

        set_activity_link(&tx, activity.id, Some(deal_id))?;
        set_deal_link(&tx, deal_id, Some(activity.id))?;

        let after = PairSnapshot {
            activity: get_activity_conn(&tx, activity.id)?,
            deal: get_deal_conn(&tx, deal_id)?,
            ..Default::default()
        };

        let action_id = insert_action_conn(
            &tx,
            &NewAction {
                activity_id: Some(activity.id),
                deal_id: Some(deal_id),
                before_state: Some(serde_json::to_string(&before)?),
                after_state: Some(serde_json::to_string(&after)?),
                ..NewAction::new(ActionType::CreateDeal, actor)
            },
        )?;

        tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
        info!(activity_id, deal_id, action_id, "created deal from activity");
        Ok((deal_id, action_id))
    }

    /// Derive an activity from an orphan deal, link it, and log the action
    pub fn create_activity_from_deal(&self, deal_id: i64, actor: &str) -> Result<(i64, i64)> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deal = get_deal_conn(&tx, deal_id)?
            .ok_or_else(|| Error::NotFound(format!("deal {}", deal_id)))?;
        if deal.linked_activity_id.is_some() {
            return Err(Error::Conflict(format!("deal {} is already linked", deal.id)));
        }

        let before = PairSnapshot {
            deal: Some(deal.clone()),
            ..Default::default()
        };

        let amount = deal.total_value();
        tx.execute(
            r#"
            INSERT INTO activities (activity_type, status, client_name, client_name_normalized, amount, activity_date, user_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                ActivityType::Sale.as_str(),
                status_for_stage(deal.stage).as_str(),
                deal.company_name,
                normalize_name(&deal.company_name),
                if amount > 0.0 { Some(amount) } else { None },
                deal.stage_changed_at.to_string(),
                deal.user_id,
            ],
        )?;
        let activity_id = tx.last_insert_rowid();

        set_activity_link(&tx, activity_id, Some(deal.id))?;
        set_deal_link(&tx, deal.id, Some(activity_id))?;

        let after = PairSnapshot {
            activity: get_activity_conn(&tx, activity_id)?,
            deal: get_deal_conn(&tx, deal.id)?,
            ..Default::default()
        };

        let action_id = insert_action_conn(
            &tx,
            &NewAction {
                activity_id: Some(activity_id),
                deal_id: Some(deal.id),
                before_state: Some(serde_json::to_string(&before)?),
                after_state: Some(serde_json::to_string(&after)?),
                ..NewAction::new(ActionType::CreateActivity, actor)
            },
        )?;

        tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
        info!(deal_id, activity_id, action_id, "created activity from deal");
        Ok((activity_id, action_id))
    }

    /// Merge two duplicate activities: repoint the drop side's link to the
    /// keep side and retire the drop side. The drop record is never deleted.
    pub fn merge_duplicates(&self, keep_id: i64, drop_id: i64, actor: &str) -> Result<i64> {
        if keep_id == drop_id {
            return Err(Error::Validation("cannot merge an activity with itself".into()));
        }

        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let keep = get_activity_conn(&tx, keep_id)?
            .ok_or_else(|| Error::NotFound(format!("activity {}", keep_id)))?;
        let drop = get_activity_conn(&tx, drop_id)?
            .ok_or_else(|| Error::NotFound(format!("activity {}", drop_id)))?;
        if keep.retired || drop.retired {
            return Err(Error::Validation(
                "cannot merge a retired activity".into(),
            ));
        }

        let mut before = PairSnapshot {
            activity: Some(keep.clone()),
            secondary_activity: Some(drop.clone()),
            ..Default::default()
        };

        let repointed_deal_id = match (keep.linked_deal_id, drop.linked_deal_id) {
            (Some(a), Some(b)) if a != b => {
                return Err(Error::Conflict(format!(
                    "activities {} and {} are linked to different deals",
                    keep_id, drop_id
                )));
            }
            (None, Some(deal_id)) => {
                // Move the link from the duplicate to the kept record
                before.deal = get_deal_conn(&tx, deal_id)?;
                set_activity_link(&tx, drop.id, None)?;
                set_activity_link(&tx, keep.id, Some(deal_id))?;
                set_deal_link(&tx, deal_id, Some(keep.id))?;
                Some(deal_id)
            }
            _ => None,
        };

        tx.execute(
            "UPDATE activities SET retired = 1 WHERE id = ?",
            params![drop.id],
        )?;

        let after = PairSnapshot {
            activity: get_activity_conn(&tx, keep.id)?,
            secondary_activity: get_activity_conn(&tx, drop.id)?,
            deal: match repointed_deal_id {
                Some(id) => get_deal_conn(&tx, id)?,
                None => None,
            },
            ..Default::default()
        };

        let action_id = insert_action_conn(
            &tx,
            &NewAction {
                activity_id: Some(keep.id),
                deal_id: repointed_deal_id,
                secondary_activity_id: Some(drop.id),
                before_state: Some(serde_json::to_string(&before)?),
                after_state: Some(serde_json::to_string(&after)?),
                ..NewAction::new(ActionType::MergeDuplicates, actor)
            },
        )?;

        tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
        info!(keep_id, drop_id, action_id, "merged duplicate activities");
        Ok(action_id)
    }

    /// Record a human review decision without touching the records.
    /// Rejected pairs stop appearing in candidate passes.
    pub fn mark_reviewed(
        &self,
        activity_id: i64,
        deal_id: i64,
        decision: ReviewDecision,
        actor: &str,
    ) -> Result<i64> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if get_activity_conn(&tx, activity_id)?.is_none() {
            return Err(Error::NotFound(format!("activity {}", activity_id)));
        }
        if get_deal_conn(&tx, deal_id)?.is_none() {
            return Err(Error::NotFound(format!("deal {}", deal_id)));
        }

        let action_id = insert_action_conn(
            &tx,
            &NewAction {
                activity_id: Some(activity_id),
                deal_id: Some(deal_id),
                decision: Some(decision.as_str()),
                ..NewAction::new(ActionType::MarkReviewed, actor)
            },
        )?;

        tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(action_id)
    }

    /// Reverse a prior action from its before-state snapshot.
    ///
    /// `Conflict` if the action was already rolled back or if the affected
    /// records no longer match the action's after-state (intervening edits
    /// are surfaced, never silently overwritten). Records the rollback as a
    /// new action; history is never mutated in place.
    pub fn rollback(&self, action_id: i64, actor: &str) -> Result<RollbackResult> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let action = get_action_conn(&tx, action_id)?
            .ok_or_else(|| Error::NotFound(format!("action {}", action_id)))?;

        if action.rolled_back {
            return Err(Error::Conflict(format!(
                "action {} was already rolled back",
                action_id
            )));
        }
        if action.action_type == ActionType::Rollback {
            return Err(Error::Validation("cannot roll back a rollback".into()));
        }

        // mark_reviewed mutated nothing; rolling it back just stops it from
        // suppressing future candidates
        if action.action_type == ActionType::MarkReviewed {
            mark_rolled_back_conn(&tx, action.id)?;
            let rollback_action_id = insert_action_conn(
                &tx,
                &NewAction {
                    activity_id: action.activity_id,
                    deal_id: action.deal_id,
                    rollback_of: Some(action.id),
                    ..NewAction::new(ActionType::Rollback, actor)
                },
            )?;
            tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
            return Ok(RollbackResult {
                action_id: action.id,
                rollback_action_id,
            });
        }

        let before: PairSnapshot = serde_json::from_str(
            action
                .before_state
                .as_deref()
                .ok_or_else(|| Error::Integrity(format!("action {} has no before-state", action.id)))?,
        )?;
        let after: PairSnapshot = serde_json::from_str(
            action
                .after_state
                .as_deref()
                .ok_or_else(|| Error::Integrity(format!("action {} has no after-state", action.id)))?,
        )?;

        // Intervening-edit check: every record the action touched must still
        // look exactly like the action left it
        for activity in [&after.activity, &after.secondary_activity].into_iter().flatten() {
            verify_activity_unchanged(&tx, activity)?;
        }
        for deal in [&after.deal, &after.secondary_deal].into_iter().flatten() {
            verify_deal_unchanged(&tx, deal)?;
        }

        // Restore mutable fields from the before-state
        for activity in [&before.activity, &before.secondary_activity].into_iter().flatten() {
            tx.execute(
                "UPDATE activities SET linked_deal_id = ?, retired = ? WHERE id = ?",
                params![activity.linked_deal_id, activity.retired, activity.id],
            )?;
        }
        for deal in [&before.deal, &before.secondary_deal].into_iter().flatten() {
            tx.execute(
                "UPDATE deals SET linked_activity_id = ? WHERE id = ?",
                params![deal.linked_activity_id, deal.id],
            )?;
        }

        // Records present after but not before were created by the action:
        // remove them again (links above were cleared first, so foreign keys
        // are satisfied)
        if before.activity.is_none() {
            if let Some(activity) = &after.activity {
                tx.execute("DELETE FROM activities WHERE id = ?", params![activity.id])?;
            }
        }
        if before.deal.is_none() {
            if let Some(deal) = &after.deal {
                tx.execute("DELETE FROM deals WHERE id = ?", params![deal.id])?;
            }
        }

        mark_rolled_back_conn(&tx, action.id)?;
        let rollback_action_id = insert_action_conn(
            &tx,
            &NewAction {
                activity_id: action.activity_id,
                deal_id: action.deal_id,
                secondary_activity_id: action.secondary_activity_id,
                rollback_of: Some(action.id),
                // A rollback's before is the original's after, and vice versa
                before_state: action.after_state.clone(),
                after_state: action.before_state.clone(),
                ..NewAction::new(ActionType::Rollback, actor)
            },
        )?;

        tx.commit().map_err(|e| Error::Transaction(e.to_string()))?;
        info!(action_id, rollback_action_id, "rolled back action");
        Ok(RollbackResult {
            action_id: action.id,
            rollback_action_id,
        })
    }
}

fn set_activity_link(conn: &Connection, activity_id: i64, deal_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE activities SET linked_deal_id = ? WHERE id = ?",
        params![deal_id, activity_id],
    )?;
    Ok(())
}

fn set_deal_link(conn: &Connection, deal_id: i64, activity_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE deals SET linked_activity_id = ? WHERE id = ?",
        params![activity_id, deal_id],
    )?;
    Ok(())
}

fn verify_activity_unchanged(conn: &Connection, expected: &Activity) -> Result<()> {
    let current = get_activity_conn(conn, expected.id)?.ok_or_else(|| {
        Error::Conflict(format!(
            "activity {} no longer exists; cannot roll back",
            expected.id
        ))
    })?;
    if serde_json::to_value(&current)? != serde_json::to_value(expected)? {
        return Err(Error::Conflict(format!(
            "activity {} was modified after the action; cannot roll back",
            expected.id
        )));
    }
    Ok(())
}

fn verify_deal_unchanged(conn: &Connection, expected: &Deal) -> Result<()> {
    let current = get_deal_conn(conn, expected.id)?.ok_or_else(|| {
        Error::Conflict(format!(
            "deal {} no longer exists; cannot roll back",
            expected.id
        ))
    })?;
    if serde_json::to_value(&current)? != serde_json::to_value(expected)? {
        return Err(Error::Conflict(format!(
            "deal {} was modified after the action; cannot roll back",
            expected.id
        )));
    }
    Ok(())
}

/// Deal stage derived when creating a deal from an activity
fn stage_for_status(status: ActivityStatus) -> DealStage {
    match status {
        ActivityStatus::Completed => DealStage::Won,
        ActivityStatus::Planned => DealStage::Open,
        ActivityStatus::Cancelled => DealStage::Lost,
    }
}

/// Activity status derived when creating an activity from a deal
fn status_for_stage(stage: DealStage) -> ActivityStatus {
    match stage {
        DealStage::Won => ActivityStatus::Completed,
        DealStage::Open => ActivityStatus::Planned,
        DealStage::Lost => ActivityStatus::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcilerConfig;
    use crate::models::{NewActivity, NewDeal, SYSTEM_ACTOR};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_activity(db: &Database, client: &str, amount: Option<f64>, day: NaiveDate) -> i64 {
        match db
            .insert_activity(&NewActivity {
                activity_type: ActivityType::Sale,
                status: ActivityStatus::Completed,
                client_name: client.to_string(),
                amount,
                activity_date: day,
                user_id: "u1".to_string(),
                import_hash: None,
            })
            .unwrap()
        {
            crate::db::ActivityInsertResult::Inserted(id) => id,
            crate::db::ActivityInsertResult::Duplicate(id) => id,
        }
    }

    fn seed_deal(db: &Database, company: &str, value: f64, day: NaiveDate) -> i64 {
        match db
            .insert_deal(&NewDeal {
                company_name: company.to_string(),
                stage: DealStage::Won,
                value_recurring: 0.0,
                value_oneoff: value,
                stage_changed_at: day,
                user_id: "u1".to_string(),
                import_hash: None,
            })
            .unwrap()
        {
            crate::db::DealInsertResult::Inserted(id) => id,
            crate::db::DealInsertResult::Duplicate(id) => id,
        }
    }

    fn link_request(activity_id: i64, deal_id: i64) -> LinkRequest {
        LinkRequest {
            activity_id,
            deal_id,
            force: false,
            actor: SYSTEM_ACTOR.to_string(),
            confidence: Some(95.0),
        }
    }

    #[test]
    fn test_link_sets_both_sides_and_logs() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        let outcome = executor.link(&link_request(a, d)).unwrap();
        let action_id = match outcome {
            LinkOutcome::Linked { action_id } => action_id,
            LinkOutcome::AlreadyLinked => panic!("expected a fresh link"),
        };

        assert_eq!(db.get_activity(a).unwrap().unwrap().linked_deal_id, Some(d));
        assert_eq!(db.get_deal(d).unwrap().unwrap().linked_activity_id, Some(a));

        let action = db.get_action(action_id).unwrap().unwrap();
        assert_eq!(action.action_type, ActionType::Link);
        assert_eq!(action.confidence, Some(95.0));
        assert!(!action.rolled_back);

        // After-state snapshot matches the live records
        let after: PairSnapshot =
            serde_json::from_str(action.after_state.as_deref().unwrap()).unwrap();
        assert_eq!(after.activity.unwrap().linked_deal_id, Some(d));
        assert_eq!(after.deal.unwrap().linked_activity_id, Some(a));
    }

    #[test]
    fn test_link_retry_is_benign_noop() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        executor.link(&link_request(a, d)).unwrap();
        let second = executor.link(&link_request(a, d)).unwrap();
        assert!(matches!(second, LinkOutcome::AlreadyLinked));

        // Exactly one action row with effect
        assert_eq!(db.recent_actions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_link_conflict_when_either_side_taken() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a1 = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let a2 = seed_activity(&db, "Acme again", Some(100.0), date(2024, 1, 15));
        let d1 = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));
        let d2 = seed_deal(&db, "Acme two", 100.0, date(2024, 1, 15));

        executor.link(&link_request(a1, d1)).unwrap();

        // Deal side taken
        assert!(matches!(
            executor.link(&link_request(a2, d1)),
            Err(Error::Conflict(_))
        ));
        // Activity side taken
        assert!(matches!(
            executor.link(&link_request(a1, d2)),
            Err(Error::Conflict(_))
        ));
        // The store never ends with two activities on one deal
        assert_eq!(db.get_deal(d1).unwrap().unwrap().linked_activity_id, Some(a1));
    }

    #[test]
    fn test_force_link_displaces_and_rolls_back() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a1 = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let a2 = seed_activity(&db, "Acme dup", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        executor.link(&link_request(a1, d)).unwrap();

        let forced = executor
            .link(&LinkRequest {
                activity_id: a2,
                deal_id: d,
                force: true,
                actor: "reviewer@example.com".to_string(),
                confidence: None,
            })
            .unwrap();
        let forced_action_id = match forced {
            LinkOutcome::Linked { action_id } => action_id,
            LinkOutcome::AlreadyLinked => panic!("expected a forced link"),
        };

        assert_eq!(db.get_activity(a1).unwrap().unwrap().linked_deal_id, None);
        assert_eq!(db.get_activity(a2).unwrap().unwrap().linked_deal_id, Some(d));

        // One rollback restores the pre-force topology
        executor.rollback(forced_action_id, "reviewer@example.com").unwrap();
        assert_eq!(db.get_activity(a1).unwrap().unwrap().linked_deal_id, Some(d));
        assert_eq!(db.get_activity(a2).unwrap().unwrap().linked_deal_id, None);
        assert_eq!(db.get_deal(d).unwrap().unwrap().linked_activity_id, Some(a1));
    }

    #[test]
    fn test_create_deal_from_activity() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme Corp", Some(5000.0), date(2024, 1, 15));

        let (deal_id, _) = executor.create_deal_from_activity(a, SYSTEM_ACTOR).unwrap();
        let deal = db.get_deal(deal_id).unwrap().unwrap();
        assert_eq!(deal.company_name, "Acme Corp");
        assert_eq!(deal.stage, DealStage::Won);
        assert_eq!(deal.value_oneoff, 5000.0);
        assert_eq!(deal.stage_changed_at, date(2024, 1, 15));
        assert_eq!(deal.linked_activity_id, Some(a));

        // Retry is a conflict, not a second deal
        assert!(matches!(
            executor.create_deal_from_activity(a, SYSTEM_ACTOR),
            Err(Error::Conflict(_))
        ));
        assert_eq!(db.count_deals().unwrap().0, 1);
    }

    #[test]
    fn test_create_activity_from_deal() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let d = seed_deal(&db, "Globex", 2500.0, date(2024, 2, 10));

        let (activity_id, _) = executor.create_activity_from_deal(d, SYSTEM_ACTOR).unwrap();
        let activity = db.get_activity(activity_id).unwrap().unwrap();
        assert_eq!(activity.activity_type, ActivityType::Sale);
        assert_eq!(activity.status, ActivityStatus::Completed);
        assert_eq!(activity.amount, Some(2500.0));
        assert_eq!(activity.activity_date, date(2024, 2, 10));
        assert_eq!(activity.linked_deal_id, Some(d));
    }

    #[test]
    fn test_create_rollback_removes_created_record() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));

        let (deal_id, action_id) = executor.create_deal_from_activity(a, SYSTEM_ACTOR).unwrap();
        executor.rollback(action_id, SYSTEM_ACTOR).unwrap();

        assert!(db.get_deal(deal_id).unwrap().is_none());
        assert_eq!(db.get_activity(a).unwrap().unwrap().linked_deal_id, None);
    }

    #[test]
    fn test_merge_repoints_link_and_retires_drop() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let keep = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let drop = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));
        executor.link(&link_request(drop, d)).unwrap();

        executor.merge_duplicates(keep, drop, "reviewer@example.com").unwrap();

        let kept = db.get_activity(keep).unwrap().unwrap();
        let dropped = db.get_activity(drop).unwrap().unwrap();
        assert_eq!(kept.linked_deal_id, Some(d));
        assert!(!kept.retired);
        assert_eq!(dropped.linked_deal_id, None);
        assert!(dropped.retired);
        assert_eq!(db.get_deal(d).unwrap().unwrap().linked_activity_id, Some(keep));
    }

    #[test]
    fn test_merge_conflict_on_divergent_links() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a1 = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let a2 = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d1 = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));
        let d2 = seed_deal(&db, "Acme 2", 100.0, date(2024, 1, 15));
        executor.link(&link_request(a1, d1)).unwrap();
        executor.link(&link_request(a2, d2)).unwrap();

        assert!(matches!(
            executor.merge_duplicates(a1, a2, SYSTEM_ACTOR),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_merge_rollback_restores_both_records() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let keep = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let drop = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));
        executor.link(&link_request(drop, d)).unwrap();

        let action_id = executor.merge_duplicates(keep, drop, SYSTEM_ACTOR).unwrap();
        executor.rollback(action_id, SYSTEM_ACTOR).unwrap();

        let kept = db.get_activity(keep).unwrap().unwrap();
        let dropped = db.get_activity(drop).unwrap().unwrap();
        assert_eq!(kept.linked_deal_id, None);
        assert_eq!(dropped.linked_deal_id, Some(d));
        assert!(!dropped.retired);
        assert_eq!(db.get_deal(d).unwrap().unwrap().linked_activity_id, Some(drop));
    }

    #[test]
    fn test_rollback_round_trip_restores_prelink_state() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        let before_activity = db.get_activity(a).unwrap().unwrap();
        let before_deal = db.get_deal(d).unwrap().unwrap();

        let outcome = executor.link(&link_request(a, d)).unwrap();
        let action_id = match outcome {
            LinkOutcome::Linked { action_id } => action_id,
            LinkOutcome::AlreadyLinked => unreachable!(),
        };
        executor.rollback(action_id, SYSTEM_ACTOR).unwrap();

        // Bit-for-bit restoration of both sides
        let restored_activity = db.get_activity(a).unwrap().unwrap();
        let restored_deal = db.get_deal(d).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&restored_activity).unwrap(),
            serde_json::to_value(&before_activity).unwrap()
        );
        assert_eq!(
            serde_json::to_value(&restored_deal).unwrap(),
            serde_json::to_value(&before_deal).unwrap()
        );

        // The original action is flagged, history preserved, rollback logged
        let original = db.get_action(action_id).unwrap().unwrap();
        assert!(original.rolled_back);
        let recent = db.recent_actions(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action_type, ActionType::Rollback);
        assert_eq!(recent[0].rollback_of, Some(action_id));
    }

    #[test]
    fn test_double_rollback_is_conflict() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        let action_id = match executor.link(&link_request(a, d)).unwrap() {
            LinkOutcome::Linked { action_id } => action_id,
            LinkOutcome::AlreadyLinked => unreachable!(),
        };
        executor.rollback(action_id, SYSTEM_ACTOR).unwrap();
        assert!(matches!(
            executor.rollback(action_id, SYSTEM_ACTOR),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_rollback_detects_intervening_edit() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        let action_id = match executor.link(&link_request(a, d)).unwrap() {
            LinkOutcome::Linked { action_id } => action_id,
            LinkOutcome::AlreadyLinked => unreachable!(),
        };

        // External edit after the action: amount changed upstream
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE activities SET amount = 999.0 WHERE id = ?",
            rusqlite::params![a],
        )
        .unwrap();

        assert!(matches!(
            executor.rollback(action_id, SYSTEM_ACTOR),
            Err(Error::Conflict(_))
        ));
        // Nothing was partially applied
        assert_eq!(db.get_activity(a).unwrap().unwrap().linked_deal_id, Some(d));
    }

    #[test]
    fn test_mark_reviewed_mutates_nothing_and_suppresses_pair() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        let action_id = executor
            .mark_reviewed(a, d, ReviewDecision::Reject, "reviewer@example.com")
            .unwrap();

        assert_eq!(db.get_activity(a).unwrap().unwrap().linked_deal_id, None);
        assert!(db.reviewed_rejected_pairs().unwrap().contains(&(a, d)));

        // Candidate generation skips the rejected pair
        let config = ReconcilerConfig::default();
        let generator = crate::candidates::CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(a).unwrap().unwrap();
        assert!(generator.candidates_for_activity(&activity).unwrap().is_empty());

        // Rolling the review back re-enables the pair
        executor.rollback(action_id, "reviewer@example.com").unwrap();
        assert!(db.reviewed_rejected_pairs().unwrap().is_empty());
        let generator = crate::candidates::CandidateGenerator::new(&db, &config).unwrap();
        assert_eq!(generator.candidates_for_activity(&activity).unwrap().len(), 1);
    }

    #[test]
    fn test_rollback_then_candidates_propose_again() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        let a = seed_activity(&db, "Acme", Some(100.0), date(2024, 1, 15));
        let d = seed_deal(&db, "Acme", 100.0, date(2024, 1, 15));

        let action_id = match executor.link(&link_request(a, d)).unwrap() {
            LinkOutcome::Linked { action_id } => action_id,
            LinkOutcome::AlreadyLinked => unreachable!(),
        };
        executor.rollback(action_id, SYSTEM_ACTOR).unwrap();

        let config = ReconcilerConfig::default();
        let generator = crate::candidates::CandidateGenerator::new(&db, &config).unwrap();
        let activity = db.get_activity(a).unwrap().unwrap();
        let candidates = generator.candidates_for_activity(&activity).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].deal_id, d);
    }

    #[test]
    fn test_link_missing_records_not_found() {
        let db = Database::in_memory().unwrap();
        let executor = ActionExecutor::new(&db);
        assert!(matches!(
            executor.link(&link_request(1, 999)),
            Err(Error::NotFound(_))
        ));
    }
}
