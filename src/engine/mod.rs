//! Placement and compensation engines
//!
//! The algorithm modules are free functions over a borrowed
//! connection; `MatrixEngine` is the pool-owning facade that wraps
//! each public operation in an immediate (write-locking) transaction
//! and emits domain events after commit.

pub mod activity;
pub mod ancestry;
pub mod commission;
pub mod events;
pub mod placement;
pub mod qualification;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::db::ledger::{self, LevelSummary};
use crate::db::models::{CommissionLedgerEntry, Member, Wallet, WalletTransaction};
use crate::db::{members, settings, wallets, DbConn, DbPool};
use crate::error::MatrixError;

pub use activity::ActivityCheck;
pub use ancestry::Ancestor;
pub use commission::{
    CommissionPayout, DistributionInput, DistributionOutcome, SkippedCommission,
};
pub use events::{EventBus, EventListener, MatrixEvent};
pub use qualification::QualificationOutcome;

/// Ledger rows plus per-level totals for one member
#[derive(Debug, Clone, Serialize)]
pub struct CommissionReport {
    pub entries: Vec<CommissionLedgerEntry>,
    pub by_level: Vec<LevelSummary>,
}

/// Facade over the placement, qualification, activity and commission
/// engines. Every mutating operation runs in one immediate transaction
/// so slot claims and ledger writes serialize across processes.
pub struct MatrixEngine {
    pool: DbPool,
    config: Config,
    events: Arc<EventBus>,
}

impl MatrixEngine {
    pub fn new(pool: DbPool, config: Config) -> Self {
        Self::with_event_bus(pool, config, Arc::new(EventBus::new()))
    }

    pub fn with_event_bus(pool: DbPool, config: Config, events: Arc<EventBus>) -> Self {
        Self {
            pool,
            config,
            events,
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn conn(&self) -> Result<DbConn, MatrixError> {
        self.pool
            .get()
            .map_err(|e| MatrixError::Internal(format!("Pool checkout failed: {}", e)))
    }

    /// Seed the commission percent table from config defaults if empty
    pub fn ensure_commission_settings_seeded(&self) -> Result<(), MatrixError> {
        let mut conn = self.conn()?;
        let config = &self.config;
        conn.immediate_transaction(|conn| settings::ensure_seeded(conn, config))
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Create an unplaced member record
    pub fn create_member(
        &self,
        input: &members::CreateMemberInput,
    ) -> Result<Member, MatrixError> {
        let mut conn = self.conn()?;
        conn.immediate_transaction(|conn| members::create_member(conn, input))
    }

    pub fn get_member(&self, member_id: &str) -> Result<Option<Member>, MatrixError> {
        let mut conn = self.conn()?;
        members::get_member(&mut conn, member_id)
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Place a member in the tree (idempotent). The sponsor's
    /// qualification is recalculated in the same transaction since a
    /// new direct may cross a tier.
    pub fn place_member(
        &self,
        member_id: &str,
        referral_code: Option<&str>,
    ) -> Result<Member, MatrixError> {
        let mut conn = self.conn()?;
        let config = &self.config;
        let now = Utc::now();

        let (placed, mut pending) = conn.immediate_transaction(|conn| {
            let before = members::require_member(conn, member_id)?;
            let was_placed = before.is_placed();
            let had_sponsor = before.sponsor_id.is_some();

            let placed = placement::place_member(conn, config, member_id, referral_code)?;
            let mut pending: Vec<MatrixEvent> = Vec::new();

            if !was_placed {
                pending.push(MatrixEvent::MemberPlaced {
                    member_id: placed.id.clone(),
                    sponsor_id: placed.sponsor_id.clone(),
                    parent_id: placed.parent_id.clone(),
                    depth: placed.depth.unwrap_or(0),
                });
            } else if !had_sponsor {
                if let Some(sponsor_id) = &placed.sponsor_id {
                    pending.push(MatrixEvent::SponsorAttached {
                        member_id: placed.id.clone(),
                        sponsor_id: sponsor_id.clone(),
                    });
                }
            }

            if let Some(sponsor_id) = placed.sponsor_id.clone() {
                let outcome = qualification::recalc_qualification(conn, config, &sponsor_id, now)?;
                push_qualification_event(&mut pending, &outcome);
            }

            Ok::<_, MatrixError>((placed, pending))
        })?;

        self.emit_all(pending.drain(..));
        Ok(placed)
    }

    /// Tree upline of a member, nearest first
    pub fn get_ancestors(
        &self,
        member_id: &str,
        max_levels: Option<usize>,
    ) -> Result<Vec<Ancestor>, MatrixError> {
        let mut conn = self.conn()?;
        let member = members::require_member(&mut conn, member_id)?;
        let levels = max_levels.unwrap_or(self.config.commission_levels.max(0) as usize);
        ancestry::get_ancestors(&mut conn, &member, levels)
    }

    /// A placed member's subtree, excluding the member itself, bounded
    /// by depth relative to it
    pub fn downline(
        &self,
        member_id: &str,
        relative_depth: i32,
    ) -> Result<Vec<Member>, MatrixError> {
        let mut conn = self.conn()?;
        let member = members::require_member(&mut conn, member_id)?;
        let Some(path) = &member.path else {
            return Ok(Vec::new());
        };
        let max_depth = member.depth.unwrap_or(0) + relative_depth.max(0);
        let rows = members::list_subtree(&mut conn, path, max_depth)?;
        Ok(rows.into_iter().filter(|m| m.id != member.id).collect())
    }

    // ========================================================================
    // Qualification & Activity
    // ========================================================================

    pub fn recalc_qualification(
        &self,
        member_id: &str,
    ) -> Result<QualificationOutcome, MatrixError> {
        let mut conn = self.conn()?;
        let config = &self.config;
        let now = Utc::now();
        let outcome = conn.immediate_transaction(|conn| {
            qualification::recalc_qualification(conn, config, member_id, now)
        })?;

        let mut pending = Vec::new();
        push_qualification_event(&mut pending, &outcome);
        self.emit_all(pending.into_iter());
        Ok(outcome)
    }

    /// Reconcile activity flags with the plan window. A lapse also
    /// recalculates the sponsor's qualification since the member stops
    /// counting as an active direct.
    pub fn ensure_active_status(&self, member_id: &str) -> Result<ActivityCheck, MatrixError> {
        let mut conn = self.conn()?;
        let config = &self.config;
        let now = Utc::now();

        let (check, pending) = conn.immediate_transaction(|conn| {
            let member = members::require_member(conn, member_id)?;
            let check = activity::ensure_active_status(conn, member, now)?;
            let mut pending: Vec<MatrixEvent> = Vec::new();

            if check.changed {
                pending.push(MatrixEvent::ActivityLapsed {
                    member_id: check.member.id.clone(),
                });
                if let Some(sponsor_id) = check.member.sponsor_id.clone() {
                    let outcome =
                        qualification::recalc_qualification(conn, config, &sponsor_id, now)?;
                    push_qualification_event(&mut pending, &outcome);
                }
            }
            Ok::<_, MatrixError>((check, pending))
        })?;

        self.emit_all(pending.into_iter());
        Ok(check)
    }

    /// Record a plan renewal effective now
    pub fn record_renewal(&self, member_id: &str) -> Result<Member, MatrixError> {
        self.record_renewal_at(member_id, Utc::now())
    }

    /// Record a plan renewal effective at `when`
    pub fn record_renewal_at(
        &self,
        member_id: &str,
        when: DateTime<Utc>,
    ) -> Result<Member, MatrixError> {
        let mut conn = self.conn()?;
        let config = &self.config;

        let (renewed, pending) = conn.immediate_transaction(|conn| {
            let renewed = activity::record_renewal(conn, config, member_id, when)?;
            let mut pending = vec![MatrixEvent::PlanRenewed {
                member_id: renewed.id.clone(),
                active_until: renewed.active_until.clone().unwrap_or_default(),
            }];
            if let Some(sponsor_id) = renewed.sponsor_id.clone() {
                let outcome = qualification::recalc_qualification(conn, config, &sponsor_id, when)?;
                push_qualification_event(&mut pending, &outcome);
            }
            Ok::<_, MatrixError>((renewed, pending))
        })?;

        self.emit_all(pending.into_iter());
        Ok(renewed)
    }

    // ========================================================================
    // Commissions & Wallets
    // ========================================================================

    /// Distribute a purchase across the purchaser's upline
    pub fn distribute_commission(
        &self,
        input: &DistributionInput,
    ) -> Result<DistributionOutcome, MatrixError> {
        let mut conn = self.conn()?;
        let config = &self.config;
        let now = Utc::now();

        let outcome = conn.immediate_transaction(|conn| {
            commission::distribute_commission(conn, config, input, now)
        })?;

        self.events.emit(MatrixEvent::PurchaseCompleted {
            member_id: input.purchaser_id.clone(),
            amount: input.base_amount.to_string(),
            currency: input
                .currency
                .clone()
                .unwrap_or_else(|| config.commission_currency.clone()),
            plan_name: input.plan_name.clone(),
            tokens: input.tokens,
        });
        self.emit_all(outcome.payouts.iter().map(|p| MatrixEvent::WalletCredited {
            member_id: p.member_id.clone(),
            amount: p.amount.to_string(),
            currency: p.currency.clone(),
        }));
        Ok(outcome)
    }

    /// Ledger rows plus per-level totals for one member
    pub fn commission_report(
        &self,
        member_id: &str,
        level: Option<i32>,
        limit: i64,
    ) -> Result<CommissionReport, MatrixError> {
        let mut conn = self.conn()?;
        let entries = ledger::list_for_member(&mut conn, member_id, level, limit)?;
        let by_level = ledger::summarize_by_level(&entries)?;
        Ok(CommissionReport { entries, by_level })
    }

    pub fn wallet(&self, member_id: &str) -> Result<Option<Wallet>, MatrixError> {
        let mut conn = self.conn()?;
        wallets::get_wallet(&mut conn, member_id)
    }

    pub fn wallet_transactions(
        &self,
        member_id: &str,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, MatrixError> {
        let mut conn = self.conn()?;
        wallets::list_transactions(&mut conn, member_id, limit)
    }

    fn emit_all<I: Iterator<Item = MatrixEvent>>(&self, events: I) {
        for event in events {
            self.events.emit(event);
        }
    }
}

fn push_qualification_event(pending: &mut Vec<MatrixEvent>, outcome: &QualificationOutcome) {
    if outcome.changed {
        pending.push(MatrixEvent::QualificationChanged {
            member_id: outcome.member_id.clone(),
            from_level: outcome.from_level,
            to_level: outcome.to_level,
        });
    }
}
