//! CSV importers for activities and deals
//!
//! Both importers hash the raw field values into an `import_hash`, so
//! re-importing the same file is a no-op: rows already present are counted as
//! skipped, not duplicated.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use sha2::{Digest, Sha256};
use std::io::Read;
use tracing::debug;

use crate::db::{ActivityInsertResult, Database, DealInsertResult};
use crate::error::{Error, Result};
use crate::models::{NewActivity, NewDeal};

/// Counts from one import run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Parse an activities CSV.
///
/// Expected header: `type,status,client_name,amount,date,user_id`
/// (column order free, matched by header name; amount may be empty).
pub fn parse_activities_csv<R: Read>(reader: R) -> Result<Vec<NewActivity>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let col = |name: &str| -> Result<usize> { column_index(&headers, name) };
    let type_col = col("type")?;
    let status_col = col("status")?;
    let name_col = col("client_name")?;
    let amount_col = col("amount")?;
    let date_col = col("date")?;
    let user_col = col("user_id")?;

    let mut activities = Vec::new();
    for result in rdr.records() {
        let record = result?;

        let activity_type = require(&record, type_col, "type")?.parse().map_err(Error::Import)?;
        let status = require(&record, status_col, "status")?.parse().map_err(Error::Import)?;
        let client_name = require(&record, name_col, "client_name")?.to_string();
        let amount = match record.get(amount_col).map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(parse_amount(s)?),
        };
        let activity_date = parse_date(require(&record, date_col, "date")?)?;
        let user_id = require(&record, user_col, "user_id")?.to_string();

        let import_hash = generate_hash(&[
            "activity",
            require(&record, type_col, "type")?,
            require(&record, status_col, "status")?,
            &client_name,
            record.get(amount_col).unwrap_or(""),
            &activity_date.to_string(),
            &user_id,
        ]);

        activities.push(NewActivity {
            activity_type,
            status,
            client_name,
            amount,
            activity_date,
            user_id,
            import_hash: Some(import_hash),
        });
    }

    debug!("Parsed {} activities from CSV", activities.len());
    Ok(activities)
}

/// Parse a deals CSV.
///
/// Expected header:
/// `company_name,stage,value_recurring,value_oneoff,stage_changed_at,user_id`
pub fn parse_deals_csv<R: Read>(reader: R) -> Result<Vec<NewDeal>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let col = |name: &str| -> Result<usize> { column_index(&headers, name) };
    let name_col = col("company_name")?;
    let stage_col = col("stage")?;
    let recurring_col = col("value_recurring")?;
    let oneoff_col = col("value_oneoff")?;
    let date_col = col("stage_changed_at")?;
    let user_col = col("user_id")?;

    let mut deals = Vec::new();
    for result in rdr.records() {
        let record = result?;

        let company_name = require(&record, name_col, "company_name")?.to_string();
        let stage = require(&record, stage_col, "stage")?.parse().map_err(Error::Import)?;
        let value_recurring = parse_optional_amount(&record, recurring_col)?;
        let value_oneoff = parse_optional_amount(&record, oneoff_col)?;
        let stage_changed_at = parse_date(require(&record, date_col, "stage_changed_at")?)?;
        let user_id = require(&record, user_col, "user_id")?.to_string();

        let import_hash = generate_hash(&[
            "deal",
            &company_name,
            require(&record, stage_col, "stage")?,
            record.get(recurring_col).unwrap_or(""),
            record.get(oneoff_col).unwrap_or(""),
            &stage_changed_at.to_string(),
            &user_id,
        ]);

        deals.push(NewDeal {
            company_name,
            stage,
            value_recurring,
            value_oneoff,
            stage_changed_at,
            user_id,
            import_hash: Some(import_hash),
        });
    }

    debug!("Parsed {} deals from CSV", deals.len());
    Ok(deals)
}

/// Parse and insert an activities CSV, skipping rows already imported
pub fn import_activities<R: Read>(db: &Database, reader: R) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for activity in parse_activities_csv(reader)? {
        match db.insert_activity(&activity)? {
            ActivityInsertResult::Inserted(_) => summary.imported += 1,
            ActivityInsertResult::Duplicate(_) => summary.skipped += 1,
        }
    }
    debug!(
        imported = summary.imported,
        skipped = summary.skipped,
        "activity import complete"
    );
    Ok(summary)
}

/// Parse and insert a deals CSV, skipping rows already imported
pub fn import_deals<R: Read>(db: &Database, reader: R) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for deal in parse_deals_csv(reader)? {
        match db.insert_deal(&deal)? {
            DealInsertResult::Inserted(_) => summary.imported += 1,
            DealInsertResult::Duplicate(_) => summary.skipped += 1,
        }
    }
    debug!(
        imported = summary.imported,
        skipped = summary.skipped,
        "deal import complete"
    );
    Ok(summary)
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::Import(format!("Missing column: {}", name)))
}

fn require<'r>(record: &'r StringRecord, index: usize, name: &str) -> Result<&'r str> {
    record
        .get(index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Import(format!("Missing {}", name)))
}

/// Content hash over the raw field values for idempotent re-import
fn generate_hash(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Parse a date string in the common formats exports use
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%d.%m.%Y", // 15.01.2024
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols and thousands separators
fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s.trim().replace(['$', '€', ',', ' '], "");

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}

fn parse_optional_amount(record: &StringRecord, index: usize) -> Result<f64> {
    match record.get(index).map(str::trim) {
        None | Some("") => Ok(0.0),
        Some(s) => parse_amount(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityStatus, ActivityType, DealStage};

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            parse_date("01/15/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date("not a date").is_err());
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_amount("5000").unwrap(), 5000.0);
        assert!(parse_amount("n/a").is_err());
    }

    #[test]
    fn test_parse_activities() {
        let csv = "type,status,client_name,amount,date,user_id\n\
                   sale,completed,Acme Corp,5000,2024-01-15,u1\n\
                   meeting,planned,Globex Ltd,,2024-01-20,u2";

        let activities = parse_activities_csv(csv.as_bytes()).unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].activity_type, ActivityType::Sale);
        assert_eq!(activities[0].status, ActivityStatus::Completed);
        assert_eq!(activities[0].amount, Some(5000.0));
        assert_eq!(activities[1].activity_type, ActivityType::Meeting);
        assert_eq!(activities[1].amount, None);
        assert!(activities[0].import_hash.is_some());
    }

    #[test]
    fn test_parse_deals() {
        let csv = "company_name,stage,value_recurring,value_oneoff,stage_changed_at,user_id\n\
                   Acme Corp,won,100,2500,2024-01-16,u1";

        let deals = parse_deals_csv(csv.as_bytes()).unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].stage, DealStage::Won);
        assert_eq!(deals[0].value_recurring, 100.0);
        assert_eq!(deals[0].value_oneoff, 2500.0);
    }

    #[test]
    fn test_missing_column_rejected() {
        let csv = "type,status,client_name,date,user_id\nsale,completed,Acme,2024-01-15,u1";
        assert!(matches!(
            parse_activities_csv(csv.as_bytes()),
            Err(Error::Import(_))
        ));
    }

    #[test]
    fn test_bad_enum_value_rejected() {
        let csv = "type,status,client_name,amount,date,user_id\n\
                   telepathy,completed,Acme,100,2024-01-15,u1";
        assert!(matches!(
            parse_activities_csv(csv.as_bytes()),
            Err(Error::Import(_))
        ));
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let csv = "type,status,client_name,amount,date,user_id\n\
                   sale,completed,Acme Corp,5000,2024-01-15,u1\n\
                   sale,completed,Globex,1200,2024-01-16,u1";

        let first = import_activities(&db, csv.as_bytes()).unwrap();
        assert_eq!(first.imported, 2);
        assert_eq!(first.skipped, 0);

        let second = import_activities(&db, csv.as_bytes()).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 2);

        let (total, _, _) = db.count_activities().unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_identical_rows_in_one_file_deduplicate() {
        let db = Database::in_memory().unwrap();
        let csv = "type,status,client_name,amount,date,user_id\n\
                   sale,completed,Acme,100,2024-01-15,u1\n\
                   sale,completed,Acme,100,2024-01-15,u1";

        let summary = import_activities(&db, csv.as_bytes()).unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
    }
}
