//! Commission ledger
//!
//! Append-only record of every commission computation outcome, one row
//! per (purchase reference, level, ancestor). The UNIQUE event_ref
//! constraint is the sole idempotency guard for financial
//! distribution: a duplicate insert is recovered, never surfaced.

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::diesel_schema::commission_ledger;
use super::models::{
    current_timestamp, ledger_status, CommissionLedgerEntry, NewCommissionLedgerEntry,
};
use crate::error::MatrixError;
use crate::money::parse_decimal;

/// Deterministic idempotency key for one (purchase, level, ancestor).
/// `reference` is the payment transaction or purchase reference the
/// caller has already resolved; distinct purchases must carry distinct
/// references or their keys would collide.
pub fn build_event_ref(reference: &str, level: i32, ancestor_id: &str) -> String {
    format!("commission:{}:{}:{}", reference, level, ancestor_id)
}

/// Input for one ledger row
#[derive(Debug, Clone)]
pub struct LedgerEntryInput<'a> {
    pub member_id: &'a str,
    pub source_member_id: &'a str,
    pub level: i32,
    pub amount: Decimal,
    pub currency: &'a str,
    pub status: &'a str,
    pub reason: Option<&'a str>,
    pub event_ref: &'a str,
}

/// Outcome of an idempotent insert attempt
#[derive(Debug, Clone)]
pub enum LedgerInsert {
    /// Row created; carries the new row id
    Inserted(String),
    /// event_ref already recorded by an earlier run
    Duplicate,
}

/// Insert a ledger row; a UNIQUE violation on event_ref means the
/// distribution already processed this (level, ancestor).
pub fn insert_entry(
    conn: &mut SqliteConnection,
    input: &LedgerEntryInput<'_>,
) -> Result<LedgerInsert, MatrixError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let amount = input.amount.to_string();
    let row = NewCommissionLedgerEntry {
        id: &id,
        member_id: input.member_id,
        source_member_id: input.source_member_id,
        level: input.level,
        amount: &amount,
        currency: input.currency,
        status: input.status,
        reason: input.reason,
        event_ref: input.event_ref,
        created_at: &now,
    };

    match diesel::insert_into(commission_ledger::table)
        .values(&row)
        .execute(conn)
    {
        Ok(_) => Ok(LedgerInsert::Inserted(id)),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Ok(LedgerInsert::Duplicate)
        }
        Err(e) => Err(MatrixError::from_diesel("Ledger insert failed", e)),
    }
}

/// Store the wallet-credit transaction id back on a PAID ledger row
pub fn link_wallet_transaction(
    conn: &mut SqliteConnection,
    ledger_id: &str,
    wallet_transaction_id: &str,
) -> Result<(), MatrixError> {
    diesel::update(commission_ledger::table.filter(commission_ledger::id.eq(ledger_id)))
        .set(commission_ledger::wallet_transaction_id.eq(wallet_transaction_id))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Ledger link failed: {}", e)))?;
    Ok(())
}

/// Look up a ledger row by its idempotency key
pub fn get_by_event_ref(
    conn: &mut SqliteConnection,
    event_ref: &str,
) -> Result<Option<CommissionLedgerEntry>, MatrixError> {
    commission_ledger::table
        .filter(commission_ledger::event_ref.eq(event_ref))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Ledger query failed: {}", e)))
}

/// List ledger rows for a member, newest first, optional level filter
pub fn list_for_member(
    conn: &mut SqliteConnection,
    member_id: &str,
    level: Option<i32>,
    limit: i64,
) -> Result<Vec<CommissionLedgerEntry>, MatrixError> {
    let mut query = commission_ledger::table
        .filter(commission_ledger::member_id.eq(member_id))
        .into_boxed();
    if let Some(level) = level {
        query = query.filter(commission_ledger::level.eq(level));
    }
    query
        .order(commission_ledger::created_at.desc())
        .limit(limit)
        .load(conn)
        .map_err(|e| MatrixError::Internal(format!("Ledger query failed: {}", e)))
}

/// Per-level PAID/SKIPPED totals for a commission report
#[derive(Debug, Clone, Serialize)]
pub struct LevelSummary {
    pub level: i32,
    pub paid_total: Decimal,
    pub skipped_total: Decimal,
    pub paid_count: i64,
    pub skipped_count: i64,
}

/// Aggregate ledger rows into ascending per-level summaries
pub fn summarize_by_level(
    entries: &[CommissionLedgerEntry],
) -> Result<Vec<LevelSummary>, MatrixError> {
    let mut by_level: std::collections::BTreeMap<i32, LevelSummary> =
        std::collections::BTreeMap::new();
    for entry in entries {
        let summary = by_level.entry(entry.level).or_insert(LevelSummary {
            level: entry.level,
            paid_total: Decimal::ZERO,
            skipped_total: Decimal::ZERO,
            paid_count: 0,
            skipped_count: 0,
        });
        let amount = parse_decimal(&entry.amount)?;
        if entry.status == ledger_status::PAID {
            summary.paid_total += amount;
            summary.paid_count += 1;
        } else {
            summary.skipped_total += amount;
            summary.skipped_count += 1;
        }
    }
    Ok(by_level.into_values().collect())
}
