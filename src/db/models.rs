//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! SQLite stores timestamps and money amounts as TEXT; amounts are
//! parsed into `rust_decimal::Decimal` at the edges.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Format an instant the same way `current_timestamp` does
pub fn format_timestamp(when: chrono::DateTime<chrono::Utc>) -> String {
    when.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a TEXT timestamp column back into an instant
pub fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

// ============================================================================
// Status Vocabularies
// ============================================================================

/// Activity statuses stored on members and activity history
pub mod activity_status {
    pub const ACTIVE: &str = "ACTIVE";
    pub const LAPSED: &str = "LAPSED";
}

/// Commission ledger row statuses
pub mod ledger_status {
    pub const PAID: &str = "PAID";
    pub const SKIPPED: &str = "SKIPPED";
}

/// Qualification history row statuses
pub mod qualification_status {
    pub const QUALIFIED: &str = "QUALIFIED";
    pub const REVOKED: &str = "REVOKED";
}

// ============================================================================
// Member Models
// ============================================================================

/// Member row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = members)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Member {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub sponsor_id: Option<String>,
    pub parent_id: Option<String>,
    pub path: Option<String>,
    pub depth: Option<i32>,
    pub position_index: Option<i32>,
    pub qualification_level: i32,
    pub activity_status: String,
    pub is_active: i32,
    pub active_until: Option<String>,
    pub last_renewal_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Member {
    /// Placed means the materialized path has been assigned
    pub fn is_placed(&self) -> bool {
        self.path.is_some()
    }
}

/// New member for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = members)]
pub struct NewMember<'a> {
    pub id: &'a str,
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub sponsor_id: Option<&'a str>,
    pub activity_status: &'a str,
    pub is_active: i32,
    pub active_until: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Slot Models
// ============================================================================

/// Available slot row: one per member still accepting direct children
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = available_slots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AvailableSlot {
    pub id: i32,
    pub member_id: String,
    pub depth: i32,
    pub path: String,
    pub child_count: i32,
}

/// New slot for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = available_slots)]
pub struct NewAvailableSlot<'a> {
    pub member_id: &'a str,
    pub depth: i32,
    pub path: &'a str,
    pub child_count: i32,
}

// ============================================================================
// Commission Models
// ============================================================================

/// Commission percent for one level
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = commission_settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommissionSetting {
    pub level: i32,
    pub percent: String,
}

/// Commission ledger row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = commission_ledger)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommissionLedgerEntry {
    pub id: String,
    pub member_id: String,
    pub source_member_id: String,
    pub level: i32,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub reason: Option<String>,
    pub event_ref: String,
    pub wallet_transaction_id: Option<String>,
    pub created_at: String,
}

/// New ledger row for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = commission_ledger)]
pub struct NewCommissionLedgerEntry<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub source_member_id: &'a str,
    pub level: i32,
    pub amount: &'a str,
    pub currency: &'a str,
    pub status: &'a str,
    pub reason: Option<&'a str>,
    pub event_ref: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// History Models
// ============================================================================

/// Activity history row, one per (member, calendar month) transition
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = activity_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ActivityHistoryRecord {
    pub id: String,
    pub member_id: String,
    pub period: String,
    pub status: String,
    pub notes: Option<String>,
    pub checked_at: String,
}

/// New activity history row for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = activity_history)]
pub struct NewActivityHistoryRecord<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub period: &'a str,
    pub status: &'a str,
    pub notes: Option<&'a str>,
    pub checked_at: &'a str,
}

/// Qualification history row, appended per tier transition
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = qualification_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QualificationHistoryRecord {
    pub id: String,
    pub member_id: String,
    pub level: i32,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
}

/// New qualification history row for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = qualification_history)]
pub struct NewQualificationHistoryRecord<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub level: i32,
    pub status: &'a str,
    pub notes: Option<&'a str>,
    pub created_at: &'a str,
}

// ============================================================================
// Wallet Models
// ============================================================================

/// Wallet row; the referral balance is the commission credit target
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = wallets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Wallet {
    pub member_id: String,
    pub main_balance: String,
    pub referral_balance: String,
    pub updated_at: String,
}

/// New wallet for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = wallets)]
pub struct NewWallet<'a> {
    pub member_id: &'a str,
    pub main_balance: &'a str,
    pub referral_balance: &'a str,
    pub updated_at: &'a str,
}

/// Wallet transaction row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = wallet_transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WalletTransaction {
    pub id: String,
    pub member_id: String,
    pub tx_type: String,
    pub status: String,
    pub provider: String,
    pub amount: String,
    pub currency: String,
    pub wallet_to: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

/// New wallet transaction for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = wallet_transactions)]
pub struct NewWalletTransaction<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub tx_type: &'a str,
    pub status: &'a str,
    pub provider: &'a str,
    pub amount: &'a str,
    pub currency: &'a str,
    pub wallet_to: Option<&'a str>,
    pub reference_id: Option<&'a str>,
    pub description: Option<&'a str>,
    pub created_at: &'a str,
}
