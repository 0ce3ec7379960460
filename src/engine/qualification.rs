//! Qualification tiers
//!
//! Tier = min(cap, active_directs / step), recomputed from live direct
//! counts whenever a sponsor's downline changes state. Every tier
//! crossed on the way up or down gets its own history row.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::debug;

use crate::config::Config;
use crate::db::models::{format_timestamp, qualification_status};
use crate::db::{history, members};
use crate::error::MatrixError;

/// Result of one qualification recalculation
#[derive(Debug, Clone)]
pub struct QualificationOutcome {
    pub member_id: String,
    pub active_directs: i64,
    pub from_level: i32,
    pub to_level: i32,
    pub changed: bool,
}

/// Pure tier function over the active-direct count
pub fn tier_for_count(config: &Config, active_directs: i64) -> i32 {
    let step = config.qualification_step.max(1) as i64;
    let level = active_directs / step;
    (level.min(config.max_qualification_level as i64)) as i32
}

/// Recompute a member's tier from its current active directs.
///
/// A no-op when the stored tier already matches; otherwise the stored
/// tier is updated and one QUALIFIED (ascending) or REVOKED
/// (descending) history row is appended per tier crossed.
pub fn recalc_qualification(
    conn: &mut SqliteConnection,
    config: &Config,
    member_id: &str,
    now: DateTime<Utc>,
) -> Result<QualificationOutcome, MatrixError> {
    let member = members::require_member(conn, member_id)?;
    let now_text = format_timestamp(now);
    let active_directs = members::count_active_directs(conn, member_id, &now_text)?;
    let to_level = tier_for_count(config, active_directs);
    let from_level = member.qualification_level;

    if to_level == from_level {
        return Ok(QualificationOutcome {
            member_id: member_id.to_string(),
            active_directs,
            from_level,
            to_level,
            changed: false,
        });
    }

    members::set_qualification_level(conn, member_id, to_level)?;
    let notes = format!("Active direct referrals: {}", active_directs);
    if to_level > from_level {
        for level in (from_level + 1)..=to_level {
            history::append_qualification(
                conn,
                member_id,
                level,
                qualification_status::QUALIFIED,
                Some(&notes),
            )?;
        }
    } else {
        for level in ((to_level + 1)..=from_level).rev() {
            history::append_qualification(
                conn,
                member_id,
                level,
                qualification_status::REVOKED,
                Some(&notes),
            )?;
        }
    }

    debug!(
        member = %member_id,
        from = from_level,
        to = to_level,
        active_directs = active_directs,
        "Qualification tier changed"
    );

    Ok(QualificationOutcome {
        member_id: member_id.to_string(),
        active_directs,
        from_level,
        to_level,
        changed: true,
    })
}
