//! Activity lifecycle
//!
//! A member is ACTIVE while its plan window (active_until) has not
//! passed; expiry lapses it lazily on the next read that cares.
//! Renewal reopens the window by the configured grace period.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use tracing::debug;

use crate::config::Config;
use crate::db::models::{activity_status, format_timestamp, parse_timestamp, Member};
use crate::db::{history, members};
use crate::error::MatrixError;

/// Result of an activity reconciliation
#[derive(Debug, Clone)]
pub struct ActivityCheck {
    pub member: Member,
    /// True only on the first ACTIVE -> LAPSED transition
    pub changed: bool,
}

fn window_expired(member: &Member, now: DateTime<Utc>) -> bool {
    match member.active_until.as_deref().and_then(parse_timestamp) {
        Some(until) => until < now,
        // No window recorded means no expiry to enforce
        None => false,
    }
}

/// Reconcile a member's stored activity flags with its plan window.
///
/// Members inside their window get flags silently repaired if stale;
/// an expired window lapses the member once, writing one activity
/// history row for the month of the transition. Re-checking an
/// already-lapsed member changes nothing.
pub fn ensure_active_status(
    conn: &mut SqliteConnection,
    member: Member,
    now: DateTime<Utc>,
) -> Result<ActivityCheck, MatrixError> {
    if !window_expired(&member, now) {
        if member.is_active == 0 || member.activity_status != activity_status::ACTIVE {
            members::set_activity_state(conn, &member.id, true, activity_status::ACTIVE)?;
            let member = members::require_member(conn, &member.id)?;
            return Ok(ActivityCheck {
                member,
                changed: false,
            });
        }
        return Ok(ActivityCheck {
            member,
            changed: false,
        });
    }

    if member.activity_status == activity_status::LAPSED && member.is_active == 0 {
        return Ok(ActivityCheck {
            member,
            changed: false,
        });
    }

    members::set_activity_state(conn, &member.id, false, activity_status::LAPSED)?;
    history::upsert_activity(
        conn,
        &member.id,
        &history::month_period(now),
        activity_status::LAPSED,
        Some("Activity period expired"),
    )?;
    debug!(member = %member.id, "Member lapsed");

    let member = members::require_member(conn, &member.id)?;
    Ok(ActivityCheck {
        member,
        changed: true,
    })
}

/// Record a plan renewal: the member is ACTIVE again with a fresh
/// window of `activity_grace_days` from `when`
pub fn record_renewal(
    conn: &mut SqliteConnection,
    config: &Config,
    member_id: &str,
    when: DateTime<Utc>,
) -> Result<Member, MatrixError> {
    members::require_member(conn, member_id)?;

    let renewed_at = format_timestamp(when);
    let active_until = format_timestamp(when + Duration::days(config.activity_grace_days));
    members::set_renewal(conn, member_id, &renewed_at, &active_until)?;
    history::upsert_activity(
        conn,
        member_id,
        &history::month_period(when),
        activity_status::ACTIVE,
        Some("Plan renewed"),
    )?;
    debug!(member = %member_id, active_until = %active_until, "Plan renewed");

    members::require_member(conn, member_id)
}
