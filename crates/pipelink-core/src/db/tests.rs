//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rusqlite::params;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_activity(client: &str, day: NaiveDate, user: &str) -> NewActivity {
        NewActivity {
            activity_type: ActivityType::Sale,
            status: ActivityStatus::Completed,
            client_name: client.to_string(),
            amount: Some(100.0),
            activity_date: day,
            user_id: user.to_string(),
            import_hash: None,
        }
    }

    fn insert_activity(db: &Database, activity: &NewActivity) -> i64 {
        match db.insert_activity(activity).unwrap() {
            ActivityInsertResult::Inserted(id) => id,
            ActivityInsertResult::Duplicate(id) => id,
        }
    }

    fn insert_deal(db: &Database, company: &str, stage: DealStage, day: NaiveDate) -> i64 {
        match db
            .insert_deal(&NewDeal {
                company_name: company.to_string(),
                stage,
                value_recurring: 0.0,
                value_oneoff: 100.0,
                stage_changed_at: day,
                user_id: "u1".to_string(),
                import_hash: None,
            })
            .unwrap()
        {
            DealInsertResult::Inserted(id) => id,
            DealInsertResult::Duplicate(id) => id,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        let (total, orphans, linked) = db.count_activities().unwrap();
        assert_eq!((total, orphans, linked), (0, 0, 0));
    }

    #[test]
    fn test_schema_has_expected_columns() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('activities') WHERE name IN ('id', 'activity_type', 'status', 'client_name', 'client_name_normalized', 'amount', 'activity_date', 'user_id', 'linked_deal_id', 'retired', 'import_hash', 'created_at')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 12, "activities table should have 12 expected columns");

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('reconciliation_actions') WHERE name IN ('id', 'action_type', 'activity_id', 'deal_id', 'secondary_activity_id', 'confidence', 'actor', 'decision', 'before_state', 'after_state', 'rolled_back', 'rollback_of', 'created_at')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            result, 13,
            "reconciliation_actions table should have 13 expected columns"
        );
    }

    #[test]
    fn test_activity_round_trip() {
        let db = Database::in_memory().unwrap();
        let id = insert_activity(&db, &new_activity("ACME Corp.", date(2024, 1, 15), "u1"));

        let activity = db.get_activity(id).unwrap().unwrap();
        assert_eq!(activity.client_name, "ACME Corp.");
        // Normalization happens on insert
        assert_eq!(activity.client_name_normalized, "acme");
        assert_eq!(activity.activity_date, date(2024, 1, 15));
        assert!(!activity.retired);
        assert_eq!(activity.linked_deal_id, None);
    }

    #[test]
    fn test_import_hash_dedup() {
        let db = Database::in_memory().unwrap();
        let mut activity = new_activity("Acme", date(2024, 1, 15), "u1");
        activity.import_hash = Some("abc123".to_string());

        let first = db.insert_activity(&activity).unwrap();
        let id = match first {
            ActivityInsertResult::Inserted(id) => id,
            ActivityInsertResult::Duplicate(_) => panic!("expected insert"),
        };

        // Same hash comes back as a duplicate with the original id
        match db.insert_activity(&activity).unwrap() {
            ActivityInsertResult::Duplicate(existing) => assert_eq!(existing, id),
            ActivityInsertResult::Inserted(_) => panic!("expected duplicate"),
        }
    }

    #[test]
    fn test_unique_link_columns() {
        let db = Database::in_memory().unwrap();
        let a1 = insert_activity(&db, &new_activity("Acme", date(2024, 1, 15), "u1"));
        let a2 = insert_activity(&db, &new_activity("Globex", date(2024, 1, 15), "u1"));
        let d = insert_deal(&db, "Acme", DealStage::Won, date(2024, 1, 15));

        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE activities SET linked_deal_id = ? WHERE id = ?",
            params![d, a1],
        )
        .unwrap();

        // The UNIQUE column enforces 1:1 at the schema level
        let result = conn.execute(
            "UPDATE activities SET linked_deal_id = ? WHERE id = ?",
            params![d, a2],
        );
        assert!(result.is_err(), "two activities must not link the same deal");
    }

    #[test]
    fn test_orphan_listing_pages_by_id() {
        let db = Database::in_memory().unwrap();
        let ids: Vec<i64> = (0..5)
            .map(|i| {
                insert_activity(
                    &db,
                    &new_activity(&format!("Client {}", i), date(2024, 1, 15), "u1"),
                )
            })
            .collect();

        let first = db.list_orphan_activities(None, 0, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, ids[0]);

        let rest = db
            .list_orphan_activities(None, first.last().unwrap().id, 10)
            .unwrap();
        assert_eq!(rest.len(), 3);

        // Owner scoping
        insert_activity(&db, &new_activity("Other", date(2024, 1, 15), "u2"));
        let scoped = db.list_orphan_activities(Some("u2"), 0, 10).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].user_id, "u2");
    }

    #[test]
    fn test_orphan_deals_are_won_only() {
        let db = Database::in_memory().unwrap();
        insert_deal(&db, "Won Co", DealStage::Won, date(2024, 1, 15));
        insert_deal(&db, "Open Co", DealStage::Open, date(2024, 1, 15));
        insert_deal(&db, "Lost Co", DealStage::Lost, date(2024, 1, 15));

        let orphans = db.list_orphan_deals(None, 0, 10).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].company_name, "Won Co");

        // The candidate pool for an activity is wider: won and open
        let pool = db
            .candidate_deals_for_activity(date(2024, 1, 15), 2, None)
            .unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_candidate_pools_respect_date_window() {
        let db = Database::in_memory().unwrap();
        insert_deal(&db, "Near", DealStage::Won, date(2024, 1, 16));
        insert_deal(&db, "Far", DealStage::Won, date(2024, 1, 25));

        let pool = db
            .candidate_deals_for_activity(date(2024, 1, 15), 2, None)
            .unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].company_name, "Near");
    }

    #[test]
    fn test_action_stats_and_daily_metrics() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        insert_action_conn(&conn, &NewAction::new(ActionType::Link, "system")).unwrap();
        insert_action_conn(&conn, &NewAction::new(ActionType::Link, "reviewer@example.com"))
            .unwrap();
        let rolled = insert_action_conn(&conn, &NewAction::new(ActionType::CreateDeal, "system"))
            .unwrap();
        mark_rolled_back_conn(&conn, rolled).unwrap();
        drop(conn);

        let stats = db.action_stats().unwrap();
        let links = stats
            .iter()
            .find(|s| s.action_type == ActionType::Link)
            .unwrap();
        assert_eq!(links.total, 2);
        assert_eq!(links.automatic, 1);
        assert_eq!(links.rolled_back, 0);

        let creates = stats
            .iter()
            .find(|s| s.action_type == ActionType::CreateDeal)
            .unwrap();
        assert_eq!(creates.rolled_back, 1);

        let metrics = db.daily_metrics(7).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].total, 3);
        assert_eq!(metrics[0].links, 2);
        assert_eq!(metrics[0].creates, 1);
    }

    #[test]
    fn test_check_integrity_flags_asymmetric_link() {
        let db = Database::in_memory().unwrap();
        let a = insert_activity(&db, &new_activity("Acme", date(2024, 1, 15), "u1"));
        let d = insert_deal(&db, "Acme", DealStage::Won, date(2024, 1, 15));

        assert!(db.check_integrity().unwrap().is_empty());

        // One-sided link, planted directly
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE activities SET linked_deal_id = ? WHERE id = ?",
            params![d, a],
        )
        .unwrap();
        drop(conn);

        let findings = db.check_integrity().unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("asymmetric"));
    }

    #[test]
    fn test_job_lifecycle() {
        let db = Database::in_memory().unwrap();
        let job_id = db.create_job(ExecutionMode::Safe).unwrap();

        let batch = BatchProgress {
            batch_index: 0,
            last_offset: 42,
            processed: 10,
            linked: 4,
            unmatched: 6,
            ..Default::default()
        };
        db.record_batch(job_id, &batch).unwrap();
        db.record_batch(job_id, &batch).unwrap();
        db.finish_job(job_id, JobStatus::Completed).unwrap();

        let snapshot = db.get_job(Some(job_id)).unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.batches_completed, 2);
        assert_eq!(snapshot.processed, 20);
        assert_eq!(snapshot.linked, 8);
        assert_eq!(snapshot.last_offset, 42);
        assert!(snapshot.finished_at.is_some());
    }
}
