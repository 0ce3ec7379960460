//! Schema initialization and migration
//!
//! Mirrors the Diesel table declarations in `diesel_schema.rs`. The
//! schema_version row gates future migrations; version 1 is the full
//! layout.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::{debug, info};

use crate::error::MatrixError;

const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS members (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT UNIQUE,
    email TEXT UNIQUE,
    phone TEXT UNIQUE,
    sponsor_id TEXT,
    parent_id TEXT,
    path TEXT,
    depth INTEGER,
    position_index INTEGER,
    qualification_level INTEGER NOT NULL DEFAULT 0,
    activity_status TEXT NOT NULL DEFAULT 'ACTIVE',
    is_active INTEGER NOT NULL DEFAULT 1,
    active_until TEXT,
    last_renewal_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_members_sponsor ON members(sponsor_id);
CREATE INDEX IF NOT EXISTS idx_members_parent ON members(parent_id);
CREATE INDEX IF NOT EXISTS idx_members_path ON members(path);

CREATE TABLE IF NOT EXISTS available_slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    member_id TEXT NOT NULL UNIQUE REFERENCES members(id),
    depth INTEGER NOT NULL,
    path TEXT NOT NULL,
    child_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_slots_depth ON available_slots(depth, id);
CREATE INDEX IF NOT EXISTS idx_slots_path ON available_slots(path);

CREATE TABLE IF NOT EXISTS commission_settings (
    level INTEGER PRIMARY KEY NOT NULL,
    percent TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS commission_ledger (
    id TEXT PRIMARY KEY NOT NULL,
    member_id TEXT NOT NULL,
    source_member_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    amount TEXT NOT NULL,
    currency TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT,
    event_ref TEXT NOT NULL UNIQUE,
    wallet_transaction_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_ledger_member ON commission_ledger(member_id, created_at);

CREATE TABLE IF NOT EXISTS activity_history (
    id TEXT PRIMARY KEY NOT NULL,
    member_id TEXT NOT NULL REFERENCES members(id),
    period TEXT NOT NULL,
    status TEXT NOT NULL,
    notes TEXT,
    checked_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (member_id, period)
);

CREATE TABLE IF NOT EXISTS qualification_history (
    id TEXT PRIMARY KEY NOT NULL,
    member_id TEXT NOT NULL REFERENCES members(id),
    level INTEGER NOT NULL,
    status TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS wallets (
    member_id TEXT PRIMARY KEY NOT NULL,
    main_balance TEXT NOT NULL DEFAULT '0',
    referral_balance TEXT NOT NULL DEFAULT '0',
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS wallet_transactions (
    id TEXT PRIMARY KEY NOT NULL,
    member_id TEXT NOT NULL,
    tx_type TEXT NOT NULL,
    status TEXT NOT NULL,
    provider TEXT NOT NULL,
    amount TEXT NOT NULL,
    currency TEXT NOT NULL,
    wallet_to TEXT,
    reference_id TEXT,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_wallet_tx_member ON wallet_transactions(member_id, created_at);
"#;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = diesel::sql_types::Integer)]
    version: i32,
}

/// Create or migrate the schema on the given connection
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), MatrixError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| MatrixError::Internal(format!("Version table failed: {}", e)))?;

    let current: Option<i32> =
        diesel::sql_query("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .load::<VersionRow>(conn)
            .map_err(|e| MatrixError::Internal(format!("Version query failed: {}", e)))?
            .into_iter()
            .next()
            .map(|row| row.version);

    match current {
        Some(v) if v >= SCHEMA_VERSION => {
            debug!(version = v, "Schema up to date");
            return Ok(());
        }
        Some(v) => {
            info!(from = v, to = SCHEMA_VERSION, "Migrating schema");
        }
        None => {
            info!(version = SCHEMA_VERSION, "Initializing schema");
        }
    }

    conn.batch_execute(SCHEMA_V1)
        .map_err(|e| MatrixError::Internal(format!("Schema init failed: {}", e)))?;

    conn.batch_execute("DELETE FROM schema_version")
        .map_err(|e| MatrixError::Internal(format!("Version reset failed: {}", e)))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<diesel::sql_types::Integer, _>(SCHEMA_VERSION)
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Version update failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        init_schema(&mut conn).unwrap();
        init_schema(&mut conn).unwrap();

        let version: Vec<VersionRow> =
            diesel::sql_query("SELECT version FROM schema_version")
                .load(&mut conn)
                .unwrap();
        assert_eq!(version.len(), 1);
        assert_eq!(version[0].version, SCHEMA_VERSION);
    }
}
