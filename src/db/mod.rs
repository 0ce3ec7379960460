//! SQLite database module for the referral tree and compensation ledger
//!
//! ## Tables
//!
//! - `members` - identity + tree attributes (materialized path, depth,
//!   sponsor vs tree parent) + qualification/activity state
//! - `available_slots` - the mutable frontier of the tree: one row per
//!   member that can still accept direct children
//! - `commission_settings` - percent per level, 1..8
//! - `commission_ledger` - idempotency-guarded payout/skip record
//! - `activity_history` / `qualification_history` - append-only audit
//! - `wallets` / `wallet_transactions` - referral-balance credits
//!
//! Per-table functions take `&mut SqliteConnection` so callers can
//! compose several operations into one transaction.

pub mod diesel_schema;
pub mod history;
pub mod ledger;
pub mod members;
pub mod models;
pub mod schema_sql;
pub mod settings;
pub mod slots;
pub mod wallets;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::info;

use crate::error::MatrixError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Applied to every pooled connection. WAL keeps concurrent readers
/// cheap; the busy timeout bounds lock waits at 5s so contended
/// placements fail retryably instead of stalling.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA busy_timeout = 5000; \
             PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Build a connection pool for the given database path (or `:memory:`)
/// and bring the schema up to date.
pub fn build_pool(database_url: &str) -> Result<DbPool, MatrixError> {
    info!(database_url = %database_url, "Opening SQLite database");

    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)
        .map_err(|e| MatrixError::Internal(format!("Failed to build pool: {}", e)))?;

    let mut conn = pool
        .get()
        .map_err(|e| MatrixError::Internal(format!("Failed to get connection: {}", e)))?;
    schema_sql::init_schema(&mut conn)?;

    Ok(pool)
}

// Re-exports
pub use models::{
    ActivityHistoryRecord, AvailableSlot, CommissionLedgerEntry, CommissionSetting, Member,
    QualificationHistoryRecord, Wallet, WalletTransaction,
};
