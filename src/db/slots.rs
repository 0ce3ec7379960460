//! Available-slot frontier operations
//!
//! One row per member that can still accept direct children. A row
//! exists iff child_count < capacity and is deleted the instant the
//! capacity is reached, so the table stays small and claimable in
//! (depth, insertion order).
//!
//! Claim semantics: callers run inside an immediate (write-locking)
//! transaction, so select-then-mutate on a slot row is serialized
//! against concurrent placements.

use diesel::prelude::*;
use tracing::debug;

use super::diesel_schema::available_slots;
use super::models::{AvailableSlot, NewAvailableSlot};
use crate::error::MatrixError;

/// Get the slot row for a member, if any
pub fn get_slot(
    conn: &mut SqliteConnection,
    member_id: &str,
) -> Result<Option<AvailableSlot>, MatrixError> {
    available_slots::table
        .filter(available_slots::member_id.eq(member_id))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Slot query failed: {}", e)))
}

/// Claim the shallowest available slot, optionally restricted to a
/// subtree by path prefix. Tie-break is slot insertion order.
pub fn claim_next_slot(
    conn: &mut SqliteConnection,
    base_path: Option<&str>,
) -> Result<Option<AvailableSlot>, MatrixError> {
    let mut query = available_slots::table.into_boxed();
    if let Some(prefix) = base_path {
        query = query.filter(available_slots::path.like(format!("{}%", prefix)));
    }
    query
        .order((available_slots::depth.asc(), available_slots::id.asc()))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::from_diesel("Slot claim failed", e))
}

/// Create (or reset) a slot for a freshly placed member at capacity 0
pub fn create_slot(
    conn: &mut SqliteConnection,
    member_id: &str,
    depth: i32,
    path: &str,
) -> Result<(), MatrixError> {
    let new_slot = NewAvailableSlot {
        member_id,
        depth,
        path,
        child_count: 0,
    };
    diesel::insert_into(available_slots::table)
        .values(&new_slot)
        .on_conflict(available_slots::member_id)
        .do_update()
        .set((
            available_slots::depth.eq(depth),
            available_slots::path.eq(path),
            available_slots::child_count.eq(0),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Slot insert failed: {}", e)))?;
    Ok(())
}

/// Reconcile a member's slot row with an observed child count:
/// update-or-create below capacity, delete at capacity.
pub fn sync_slot(
    conn: &mut SqliteConnection,
    member_id: &str,
    depth: i32,
    path: &str,
    child_count: i32,
    capacity: i32,
) -> Result<(), MatrixError> {
    if child_count >= capacity {
        diesel::delete(
            available_slots::table.filter(available_slots::member_id.eq(member_id)),
        )
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Slot delete failed: {}", e)))?;
        debug!(member_id = %member_id, "Slot at capacity, removed from frontier");
        return Ok(());
    }

    let new_slot = NewAvailableSlot {
        member_id,
        depth,
        path,
        child_count,
    };
    diesel::insert_into(available_slots::table)
        .values(&new_slot)
        .on_conflict(available_slots::member_id)
        .do_update()
        .set((
            available_slots::depth.eq(depth),
            available_slots::path.eq(path),
            available_slots::child_count.eq(child_count),
        ))
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Slot sync failed: {}", e)))?;
    Ok(())
}

/// Consume one unit of a claimed slot's capacity: increment the child
/// count, or delete the row when this child fills it.
pub fn consume_slot(
    conn: &mut SqliteConnection,
    slot: &AvailableSlot,
    capacity: i32,
) -> Result<(), MatrixError> {
    if slot.child_count + 1 >= capacity {
        diesel::delete(available_slots::table.filter(available_slots::id.eq(slot.id)))
            .execute(conn)
            .map_err(|e| MatrixError::Internal(format!("Slot delete failed: {}", e)))?;
    } else {
        diesel::update(available_slots::table.filter(available_slots::id.eq(slot.id)))
            .set(available_slots::child_count.eq(slot.child_count + 1))
            .execute(conn)
            .map_err(|e| MatrixError::Internal(format!("Slot update failed: {}", e)))?;
    }
    Ok(())
}

/// Number of open slots (diagnostics)
pub fn slot_count(conn: &mut SqliteConnection) -> Result<i64, MatrixError> {
    available_slots::table
        .count()
        .get_result(conn)
        .map_err(|e| MatrixError::Internal(format!("Slot count failed: {}", e)))
}
