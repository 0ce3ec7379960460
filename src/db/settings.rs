//! Commission percent table
//!
//! Levels 1..N with a percent each, seeded from configuration defaults
//! the first time the table is read.

use diesel::prelude::*;
use rust_decimal::Decimal;
use tracing::info;

use super::diesel_schema::commission_settings;
use super::models::CommissionSetting;
use crate::config::Config;
use crate::error::MatrixError;
use crate::money::parse_percent;

/// Normalize configured default percents: validate, pad missing levels
/// with zero, truncate extras to the configured level count.
pub fn normalized_defaults(config: &Config) -> Result<Vec<Decimal>, MatrixError> {
    let levels = config.commission_levels.max(0) as usize;
    let mut percents = Vec::with_capacity(levels);
    for raw in &config.commission_percents {
        percents.push(parse_percent(raw)?);
    }
    percents.resize(levels, Decimal::ZERO);
    percents.truncate(levels);
    Ok(percents)
}

/// Load the percent table ordered by level, seeding defaults when empty
pub fn fetch_percents(
    conn: &mut SqliteConnection,
    config: &Config,
) -> Result<Vec<(i32, Decimal)>, MatrixError> {
    let rows: Vec<CommissionSetting> = commission_settings::table
        .order(commission_settings::level.asc())
        .load(conn)
        .map_err(|e| MatrixError::Internal(format!("Settings query failed: {}", e)))?;

    if rows.is_empty() {
        let defaults = seed_defaults(conn, config)?;
        return Ok(defaults
            .into_iter()
            .enumerate()
            .map(|(i, percent)| (i as i32 + 1, percent))
            .collect());
    }

    rows.iter()
        .map(|row| parse_percent(&row.percent).map(|p| (row.level, p)))
        .collect()
}

/// Seed the table from configuration defaults if it is empty
pub fn ensure_seeded(conn: &mut SqliteConnection, config: &Config) -> Result<(), MatrixError> {
    let existing: i64 = commission_settings::table
        .count()
        .get_result(conn)
        .map_err(|e| MatrixError::Internal(format!("Settings count failed: {}", e)))?;
    if existing == 0 {
        seed_defaults(conn, config)?;
    }
    Ok(())
}

fn seed_defaults(
    conn: &mut SqliteConnection,
    config: &Config,
) -> Result<Vec<Decimal>, MatrixError> {
    let defaults = normalized_defaults(config)?;
    let rows: Vec<CommissionSetting> = defaults
        .iter()
        .enumerate()
        .map(|(i, percent)| CommissionSetting {
            level: i as i32 + 1,
            percent: percent.to_string(),
        })
        .collect();

    diesel::insert_into(commission_settings::table)
        .values(&rows)
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Settings seed failed: {}", e)))?;

    info!(levels = rows.len(), "Seeded commission settings from defaults");
    Ok(defaults)
}
