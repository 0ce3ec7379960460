//! Placement engine
//!
//! Assigns a sponsor and tree position to an unplaced member over the
//! capacity-bounded slot frontier. Placement always terminates: direct
//! under the sponsor, spillover into the sponsor's subtree, globally
//! shallowest slot, or a new root in the worst case.
//!
//! Sponsor (referral attribution) and tree parent (adjacency owner)
//! may diverge under spillover; the original referral is kept on
//! sponsor_id.

use diesel::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::models::{AvailableSlot, Member};
use crate::db::{members, slots};
use crate::error::MatrixError;

/// Materialized path of a root member
fn root_path(member_id: &str) -> String {
    format!("/{}/", member_id)
}

/// Materialized path of a child under `parent_path`
fn child_path(parent_path: &str, member_id: &str) -> String {
    format!("{}{}/", parent_path, member_id)
}

// ============================================================================
// Sponsor Resolution
// ============================================================================

/// Ordered referral lookup strategies; first match wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralLookup {
    ById,
    ByEmail,
    ByPhone,
    ByUsername,
}

impl ReferralLookup {
    /// Resolution order tried for every referral code
    pub const ORDER: [ReferralLookup; 4] = [
        ReferralLookup::ById,
        ReferralLookup::ByEmail,
        ReferralLookup::ByPhone,
        ReferralLookup::ByUsername,
    ];

    /// Whether this strategy applies to the given code at all
    fn applies(&self, code: &str) -> bool {
        match self {
            ReferralLookup::ById | ReferralLookup::ByUsername => true,
            ReferralLookup::ByEmail => code.contains('@'),
            ReferralLookup::ByPhone => {
                !code.is_empty() && code.chars().all(|c| c.is_ascii_digit())
            }
        }
    }

    fn find(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<Member>, MatrixError> {
        match self {
            ReferralLookup::ById => members::get_member(conn, code),
            ReferralLookup::ByEmail => members::find_by_email(conn, code),
            ReferralLookup::ByPhone => members::find_by_phone(conn, code),
            ReferralLookup::ByUsername => members::find_by_username(conn, code),
        }
    }
}

fn normalize_referral(referral: Option<&str>) -> Option<&str> {
    let trimmed = referral?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Resolve a referral code to a sponsor, falling back to the
/// configured root member when nothing matches
pub fn resolve_sponsor(
    conn: &mut SqliteConnection,
    config: &Config,
    referral: Option<&str>,
) -> Result<Option<Member>, MatrixError> {
    if let Some(code) = normalize_referral(referral) {
        for strategy in ReferralLookup::ORDER {
            if !strategy.applies(code) {
                continue;
            }
            if let Some(member) = strategy.find(conn, code)? {
                debug!(code = %code, strategy = ?strategy, sponsor = %member.id, "Referral resolved");
                return Ok(Some(member));
            }
        }
    }

    match &config.root_member_id {
        Some(root_id) => members::get_member(conn, root_id),
        None => Ok(None),
    }
}

// ============================================================================
// Placement Primitives
// ============================================================================

/// Give a member a path if it has none yet (self-rooted), and bring
/// its slot row in line with its actual child count.
fn ensure_member_path(
    conn: &mut SqliteConnection,
    config: &Config,
    member: Member,
) -> Result<Member, MatrixError> {
    if member.is_placed() {
        return Ok(member);
    }

    let path = root_path(&member.id);
    let depth = member.depth.unwrap_or(0);
    let placed = members::assign_placement(
        conn,
        &member.id,
        &members::PlacementFields {
            sponsor_id: member.sponsor_id.as_deref(),
            parent_id: member.parent_id.as_deref(),
            path: &path,
            depth,
            position_index: 0,
        },
    )?;

    let child_count = members::direct_child_count(conn, &placed.id)? as i32;
    slots::sync_slot(conn, &placed.id, depth, &path, child_count, config.child_limit)?;
    Ok(placed)
}

/// Place the configured root member as the depth-0 root if it exists
/// and is still unplaced
fn ensure_root_bootstrap(conn: &mut SqliteConnection, config: &Config) -> Result<(), MatrixError> {
    let Some(root_id) = &config.root_member_id else {
        return Ok(());
    };
    let Some(root) = members::get_member(conn, root_id)? else {
        return Ok(());
    };

    let placed = ensure_member_path(conn, config, root)?;
    let child_count = members::direct_child_count(conn, &placed.id)? as i32;
    let path = placed.path.clone().unwrap_or_else(|| root_path(&placed.id));
    slots::sync_slot(
        conn,
        &placed.id,
        placed.depth.unwrap_or(0),
        &path,
        child_count,
        config.child_limit,
    )?;
    Ok(())
}

/// Place as a brand-new root (empty frontier)
fn place_as_root(
    conn: &mut SqliteConnection,
    member_id: &str,
    sponsor_id: Option<&str>,
) -> Result<Member, MatrixError> {
    let path = root_path(member_id);
    let placed = members::assign_placement(
        conn,
        member_id,
        &members::PlacementFields {
            sponsor_id,
            parent_id: None,
            path: &path,
            depth: 0,
            position_index: 0,
        },
    )?;
    slots::create_slot(conn, member_id, 0, &path)?;
    info!(member = %member_id, "Placed as new root");
    Ok(placed)
}

/// Place directly under the sponsor while it has spare capacity.
/// Returns None when the sponsor is full and spillover is needed.
fn place_under_sponsor(
    conn: &mut SqliteConnection,
    config: &Config,
    sponsor: &Member,
    member_id: &str,
) -> Result<Option<Member>, MatrixError> {
    let child_count_before = members::direct_child_count(conn, &sponsor.id)? as i32;
    if child_count_before >= config.child_limit {
        return Ok(None);
    }

    let parent_path = sponsor
        .path
        .clone()
        .unwrap_or_else(|| root_path(&sponsor.id));
    let parent_depth = sponsor.depth.unwrap_or(0);
    let depth = parent_depth + 1;
    let path = child_path(&parent_path, member_id);

    let placed = members::assign_placement(
        conn,
        member_id,
        &members::PlacementFields {
            sponsor_id: Some(&sponsor.id),
            parent_id: Some(&sponsor.id),
            path: &path,
            depth,
            position_index: child_count_before,
        },
    )?;

    slots::sync_slot(
        conn,
        &sponsor.id,
        parent_depth,
        &parent_path,
        child_count_before + 1,
        config.child_limit,
    )?;
    slots::create_slot(conn, member_id, depth, &path)?;
    Ok(Some(placed))
}

/// Place under a claimed slot's owner. The sponsor attribution stays
/// with the originally resolved referral even though the tree parent
/// is the slot owner.
fn place_under_slot(
    conn: &mut SqliteConnection,
    config: &Config,
    slot: &AvailableSlot,
    member_id: &str,
    sponsor_id: Option<&str>,
) -> Result<Member, MatrixError> {
    let position_index = slot.child_count;
    let depth = slot.depth + 1;
    let path = child_path(&slot.path, member_id);

    slots::consume_slot(conn, slot, config.child_limit)?;

    let placed = members::assign_placement(
        conn,
        member_id,
        &members::PlacementFields {
            sponsor_id,
            parent_id: Some(&slot.member_id),
            path: &path,
            depth,
            position_index,
        },
    )?;

    slots::create_slot(conn, member_id, depth, &path)?;
    Ok(placed)
}

// ============================================================================
// Entry Point
// ============================================================================

/// Assign sponsor and tree position to a member.
///
/// Idempotent: an already-placed member is returned unchanged, except
/// that a missing sponsor_id is attached when the referral now
/// resolves. Must run inside a write transaction; slot claim and
/// capacity mutation rely on it for serialization.
pub fn place_member(
    conn: &mut SqliteConnection,
    config: &Config,
    member_id: &str,
    referral_code: Option<&str>,
) -> Result<Member, MatrixError> {
    let current = members::require_member(conn, member_id)?;

    if current.is_placed() {
        if current.sponsor_id.is_none() && referral_code.is_some() {
            if let Some(sponsor) = resolve_sponsor(conn, config, referral_code)? {
                debug!(member = %member_id, sponsor = %sponsor.id, "Attached sponsor to placed member");
                return members::attach_sponsor(conn, member_id, &sponsor.id);
            }
        }
        return Ok(current);
    }

    ensure_root_bootstrap(conn, config)?;
    // The bootstrap places the configured root itself; re-read so a
    // call targeting the root sees its own placement
    let current = members::require_member(conn, member_id)?;
    if current.is_placed() {
        return Ok(current);
    }

    // A member can never sponsor itself
    let sponsor = resolve_sponsor(conn, config, referral_code)?.filter(|s| s.id != member_id);

    if let Some(sponsor) = sponsor {
        let sponsor = ensure_member_path(conn, config, sponsor)?;

        if let Some(placed) = place_under_sponsor(conn, config, &sponsor, member_id)? {
            return Ok(placed);
        }

        // Sponsor full: spill over into the shallowest slot of its subtree
        let base_path = sponsor
            .path
            .clone()
            .unwrap_or_else(|| root_path(&sponsor.id));
        if let Some(slot) = slots::claim_next_slot(conn, Some(&base_path))? {
            debug!(member = %member_id, sponsor = %sponsor.id, parent = %slot.member_id, "Spillover placement");
            return place_under_slot(conn, config, &slot, member_id, Some(&sponsor.id));
        }

        // Subtree exhausted: fall through to the global frontier
        return match slots::claim_next_slot(conn, None)? {
            Some(slot) => place_under_slot(conn, config, &slot, member_id, Some(&sponsor.id)),
            None => place_as_root(conn, member_id, Some(&sponsor.id)),
        };
    }

    match slots::claim_next_slot(conn, None)? {
        Some(slot) => place_under_slot(conn, config, &slot, member_id, None),
        None => place_as_root(conn, member_id, None),
    }
}
