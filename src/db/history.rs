//! Activity and qualification audit history
//!
//! Activity history is keyed by (member, calendar month) and upserted;
//! qualification history is append-only, one row per tier transition.
//! Both are written only on actual state changes.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::{activity_history, qualification_history};
use super::models::{
    current_timestamp, ActivityHistoryRecord, NewActivityHistoryRecord,
    NewQualificationHistoryRecord, QualificationHistoryRecord,
};
use crate::error::MatrixError;

/// First instant of the UTC month containing `when`, formatted like
/// other TEXT timestamp columns
pub fn month_period(when: DateTime<Utc>) -> String {
    let start = Utc
        .with_ymd_and_hms(when.year(), when.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(when);
    start.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Upsert one activity-history row per (member, period)
pub fn upsert_activity(
    conn: &mut SqliteConnection,
    member_id: &str,
    period: &str,
    status: &str,
    notes: Option<&str>,
) -> Result<(), MatrixError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let row = NewActivityHistoryRecord {
        id: &id,
        member_id,
        period,
        status,
        notes,
        checked_at: &now,
    };

    diesel::insert_into(activity_history::table)
        .values(&row)
        .on_conflict((activity_history::member_id, activity_history::period))
        .do_update()
        .set((
            activity_history::status.eq(status),
            activity_history::notes.eq(notes),
            activity_history::checked_at.eq(&now),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Activity history upsert failed: {}", e)))?;
    Ok(())
}

/// Append one qualification-history row for a tier transition
pub fn append_qualification(
    conn: &mut SqliteConnection,
    member_id: &str,
    level: i32,
    status: &str,
    notes: Option<&str>,
) -> Result<(), MatrixError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let row = NewQualificationHistoryRecord {
        id: &id,
        member_id,
        level,
        status,
        notes,
        created_at: &now,
    };

    diesel::insert_into(qualification_history::table)
        .values(&row)
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Qualification history insert failed: {}", e)))?;
    Ok(())
}

/// Activity history for a member, newest period first
pub fn list_activity(
    conn: &mut SqliteConnection,
    member_id: &str,
) -> Result<Vec<ActivityHistoryRecord>, MatrixError> {
    activity_history::table
        .filter(activity_history::member_id.eq(member_id))
        .order(activity_history::period.desc())
        .load(conn)
        .map_err(|e| MatrixError::Internal(format!("Activity history query failed: {}", e)))
}

/// Qualification history for a member in transition order
pub fn list_qualification(
    conn: &mut SqliteConnection,
    member_id: &str,
) -> Result<Vec<QualificationHistoryRecord>, MatrixError> {
    qualification_history::table
        .filter(qualification_history::member_id.eq(member_id))
        .order(qualification_history::created_at.asc())
        .load(conn)
        .map_err(|e| MatrixError::Internal(format!("Qualification history query failed: {}", e)))
}
