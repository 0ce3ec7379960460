//! Member CRUD and tree-attribute queries
//!
//! Members are created unplaced by the registration collaborator; the
//! placement engine assigns path/depth/parent exactly once. All
//! functions take `&mut SqliteConnection` so they compose inside a
//! caller-owned transaction.

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::members;
use super::models::{activity_status, current_timestamp, Member, NewMember};
use crate::error::MatrixError;

/// Input for creating an unplaced member
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMemberInput {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub sponsor_id: Option<String>,
    #[serde(default)]
    pub active_until: Option<String>,
}

/// Tree attributes written exactly once by the placement engine
#[derive(Debug, Clone)]
pub struct PlacementFields<'a> {
    pub sponsor_id: Option<&'a str>,
    pub parent_id: Option<&'a str>,
    pub path: &'a str,
    pub depth: i32,
    pub position_index: i32,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get member by ID
pub fn get_member(conn: &mut SqliteConnection, id: &str) -> Result<Option<Member>, MatrixError> {
    members::table
        .filter(members::id.eq(id))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Member query failed: {}", e)))
}

/// Get member by ID, or NotFound
pub fn require_member(conn: &mut SqliteConnection, id: &str) -> Result<Member, MatrixError> {
    get_member(conn, id)?.ok_or_else(|| MatrixError::NotFound(format!("Member {}", id)))
}

/// Find member by exact email
pub fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<Member>, MatrixError> {
    members::table
        .filter(members::email.eq(email))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Member query failed: {}", e)))
}

/// Find member by exact phone number
pub fn find_by_phone(
    conn: &mut SqliteConnection,
    phone: &str,
) -> Result<Option<Member>, MatrixError> {
    members::table
        .filter(members::phone.eq(phone))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Member query failed: {}", e)))
}

/// Find member by username
pub fn find_by_username(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<Option<Member>, MatrixError> {
    members::table
        .filter(members::username.eq(username))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Member query failed: {}", e)))
}

/// Count direct tree children of a member
pub fn direct_child_count(
    conn: &mut SqliteConnection,
    parent_id: &str,
) -> Result<i64, MatrixError> {
    members::table
        .filter(members::parent_id.eq(parent_id))
        .count()
        .get_result(conn)
        .map_err(|e| MatrixError::Internal(format!("Child count failed: {}", e)))
}

/// Count direct sponsees currently counting toward qualification:
/// active flag, ACTIVE status, and plan not expired as of `now`.
pub fn count_active_directs(
    conn: &mut SqliteConnection,
    sponsor_id: &str,
    now: &str,
) -> Result<i64, MatrixError> {
    members::table
        .filter(members::sponsor_id.eq(sponsor_id))
        .filter(members::is_active.eq(1))
        .filter(members::activity_status.eq(activity_status::ACTIVE))
        .filter(
            members::active_until
                .is_null()
                .or(members::active_until.gt(now)),
        )
        .count()
        .get_result(conn)
        .map_err(|e| MatrixError::Internal(format!("Active direct count failed: {}", e)))
}

/// List a placed member's subtree by path prefix, bounded by relative
/// depth. The target row itself is included; callers drop it when
/// presenting downline-only views.
pub fn list_subtree(
    conn: &mut SqliteConnection,
    path_prefix: &str,
    max_depth: i32,
) -> Result<Vec<Member>, MatrixError> {
    let pattern = format!("{}%", path_prefix);
    members::table
        .filter(members::path.like(pattern))
        .filter(members::depth.le(max_depth))
        .order((members::depth.asc(), members::created_at.asc()))
        .load(conn)
        .map_err(|e| MatrixError::Internal(format!("Subtree query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create an unplaced member (registration collaborator entry point)
pub fn create_member(
    conn: &mut SqliteConnection,
    input: &CreateMemberInput,
) -> Result<Member, MatrixError> {
    if input.id.is_empty() {
        return Err(MatrixError::InvalidInput("member id is required".into()));
    }

    let now = current_timestamp();
    let new_member = NewMember {
        id: &input.id,
        username: input.username.as_deref(),
        email: input.email.as_deref(),
        phone: input.phone.as_deref(),
        sponsor_id: input.sponsor_id.as_deref(),
        activity_status: activity_status::ACTIVE,
        is_active: 1,
        active_until: input.active_until.as_deref(),
        created_at: &now,
        updated_at: &now,
    };

    diesel::insert_into(members::table)
        .values(&new_member)
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Member insert failed: {}", e)))?;

    require_member(conn, &input.id)
}

/// Write placement fields. The path is immutable once set; callers
/// must check `is_placed` first.
pub fn assign_placement(
    conn: &mut SqliteConnection,
    member_id: &str,
    fields: &PlacementFields<'_>,
) -> Result<Member, MatrixError> {
    diesel::update(members::table.filter(members::id.eq(member_id)))
        .set((
            members::sponsor_id.eq(fields.sponsor_id),
            members::parent_id.eq(fields.parent_id),
            members::path.eq(fields.path),
            members::depth.eq(fields.depth),
            members::position_index.eq(fields.position_index),
            members::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Placement update failed: {}", e)))?;

    require_member(conn, member_id)
}

/// Attach a sponsor without touching tree position (idempotent repair
/// path for members placed before their referral resolved)
pub fn attach_sponsor(
    conn: &mut SqliteConnection,
    member_id: &str,
    sponsor_id: &str,
) -> Result<Member, MatrixError> {
    diesel::update(members::table.filter(members::id.eq(member_id)))
        .set((
            members::sponsor_id.eq(sponsor_id),
            members::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Sponsor update failed: {}", e)))?;

    require_member(conn, member_id)
}

/// Set the stored qualification tier
pub fn set_qualification_level(
    conn: &mut SqliteConnection,
    member_id: &str,
    level: i32,
) -> Result<(), MatrixError> {
    diesel::update(members::table.filter(members::id.eq(member_id)))
        .set((
            members::qualification_level.eq(level),
            members::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Qualification update failed: {}", e)))?;
    Ok(())
}

/// Set the activity flags
pub fn set_activity_state(
    conn: &mut SqliteConnection,
    member_id: &str,
    is_active: bool,
    status: &str,
) -> Result<(), MatrixError> {
    diesel::update(members::table.filter(members::id.eq(member_id)))
        .set((
            members::is_active.eq(if is_active { 1 } else { 0 }),
            members::activity_status.eq(status),
            members::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Activity update failed: {}", e)))?;
    Ok(())
}

/// Record a plan renewal: active again until `active_until`
pub fn set_renewal(
    conn: &mut SqliteConnection,
    member_id: &str,
    renewed_at: &str,
    active_until: &str,
) -> Result<(), MatrixError> {
    diesel::update(members::table.filter(members::id.eq(member_id)))
        .set((
            members::is_active.eq(1),
            members::activity_status.eq(activity_status::ACTIVE),
            members::last_renewal_at.eq(renewed_at),
            members::active_until.eq(active_until),
            members::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Renewal update failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema_sql;

    fn setup() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        schema_sql::init_schema(&mut conn).unwrap();
        conn
    }

    fn member(id: &str) -> CreateMemberInput {
        CreateMemberInput {
            id: id.to_string(),
            username: Some(format!("user-{}", id)),
            email: Some(format!("{}@example.com", id)),
            phone: None,
            sponsor_id: None,
            active_until: None,
        }
    }

    #[test]
    fn create_and_lookup() {
        let mut conn = setup();
        create_member(&mut conn, &member("m-1")).unwrap();

        assert!(get_member(&mut conn, "m-1").unwrap().is_some());
        assert!(find_by_email(&mut conn, "m-1@example.com").unwrap().is_some());
        assert!(find_by_username(&mut conn, "user-m-1").unwrap().is_some());
        assert!(get_member(&mut conn, "missing").unwrap().is_none());
        assert!(matches!(
            require_member(&mut conn, "missing"),
            Err(MatrixError::NotFound(_))
        ));
    }

    #[test]
    fn placement_fields_roundtrip() {
        let mut conn = setup();
        create_member(&mut conn, &member("m-1")).unwrap();

        let placed = assign_placement(
            &mut conn,
            "m-1",
            &PlacementFields {
                sponsor_id: None,
                parent_id: None,
                path: "/m-1/",
                depth: 0,
                position_index: 0,
            },
        )
        .unwrap();
        assert!(placed.is_placed());
        assert_eq!(placed.depth, Some(0));
        assert_eq!(placed.path.as_deref(), Some("/m-1/"));
    }

    #[test]
    fn active_direct_count_filters_lapsed_and_expired() {
        let mut conn = setup();
        create_member(&mut conn, &member("sponsor")).unwrap();
        for id in ["a", "b", "c"] {
            let mut input = member(id);
            input.sponsor_id = Some("sponsor".into());
            create_member(&mut conn, &input).unwrap();
        }
        // b lapsed, c expired
        set_activity_state(&mut conn, "b", false, activity_status::LAPSED).unwrap();
        diesel::update(members::table.filter(members::id.eq("c")))
            .set(members::active_until.eq("2000-01-01T00:00:00Z"))
            .execute(&mut conn)
            .unwrap();

        let count =
            count_active_directs(&mut conn, "sponsor", "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(count, 1);
    }
}
