//! Level commission distribution
//!
//! Cascades a purchase up the purchaser's tree upline, one ledger row
//! per (purchase, level, ancestor). Every outcome is recorded: paid
//! levels credit the ancestor's referral balance, ineligible levels
//! get a SKIPPED row carrying the reason. The UNIQUE event_ref makes
//! redelivered purchase events harmless.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::models::{activity_status, ledger_status, parse_timestamp, Member};
use crate::db::{ledger, members, settings, wallets};
use crate::engine::{activity, ancestry};
use crate::error::MatrixError;

/// One purchase to distribute commissions for
#[derive(Debug, Clone, Default)]
pub struct DistributionInput {
    pub purchaser_id: String,
    pub base_amount: Decimal,
    pub currency: Option<String>,
    /// Payment transaction reference, preferred for the idempotency key
    pub transaction_ref: Option<String>,
    /// Purchase/order reference, the fallback key component
    pub purchase_ref: Option<String>,
    /// Plan context carried through to the purchase event payload
    pub plan_name: Option<String>,
    pub tokens: Option<i64>,
}

/// A credited level
#[derive(Debug, Clone, Serialize)]
pub struct CommissionPayout {
    pub member_id: String,
    pub level: i32,
    pub amount: Decimal,
    pub currency: String,
    pub event_ref: String,
    pub wallet_transaction_id: String,
}

/// A level that produced no credit, with the recorded reason
#[derive(Debug, Clone, Serialize)]
pub struct SkippedCommission {
    pub member_id: String,
    pub level: i32,
    pub reason: String,
    pub event_ref: String,
}

/// Outcome of one distribution run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DistributionOutcome {
    pub payouts: Vec<CommissionPayout>,
    pub skipped: Vec<SkippedCommission>,
}

/// Why an ancestor is not paid at a level, in check order
fn ineligibility_reason(member: &Member, level: i32, now: DateTime<Utc>) -> Option<&'static str> {
    if member.is_active == 0 || member.activity_status != activity_status::ACTIVE {
        return Some("Ancestor inactive");
    }
    if let Some(until) = member.active_until.as_deref().and_then(parse_timestamp) {
        if until < now {
            return Some("Plan expired");
        }
    }
    if member.qualification_level < level {
        return Some("Level not qualified");
    }
    None
}

/// Distribute a purchase across the upline.
///
/// Non-positive amounts distribute nothing. Each level first refreshes
/// the ancestor's activity flags, then records exactly one ledger row;
/// a duplicate event_ref means an earlier run already handled the
/// level and it is reported skipped without a new row.
pub fn distribute_commission(
    conn: &mut SqliteConnection,
    config: &Config,
    input: &DistributionInput,
    now: DateTime<Utc>,
) -> Result<DistributionOutcome, MatrixError> {
    let mut outcome = DistributionOutcome::default();
    if input.base_amount <= Decimal::ZERO {
        debug!(purchaser = %input.purchaser_id, "Non-positive base amount, nothing to distribute");
        return Ok(outcome);
    }
    // Without a reference the idempotency keys of distinct purchases
    // would collide
    let Some(reference) = input
        .transaction_ref
        .as_deref()
        .or(input.purchase_ref.as_deref())
    else {
        return Err(MatrixError::InvalidInput(
            "a transaction or purchase reference is required".into(),
        ));
    };

    let purchaser = members::require_member(conn, &input.purchaser_id)?;
    let currency = input
        .currency
        .clone()
        .unwrap_or_else(|| config.commission_currency.clone());
    let percents = settings::fetch_percents(conn, config)?;
    let ancestor_ids = purchaser
        .path
        .as_deref()
        .map(|path| {
            ancestry::ancestor_ids(path, &purchaser.id, config.commission_levels.max(0) as usize)
        })
        .unwrap_or_default();

    for (idx, ancestor_id) in ancestor_ids.iter().enumerate() {
        let level = idx as i32 + 1;
        let Some(&(_, percent)) = percents.iter().find(|(l, _)| *l == level) else {
            continue;
        };

        let event_ref = ledger::build_event_ref(reference, level, ancestor_id);

        let Some(ancestor) = members::get_member(conn, ancestor_id)? else {
            record_skip(
                conn,
                &mut outcome,
                ancestor_id,
                &purchaser.id,
                level,
                &currency,
                "Ancestor missing",
                &event_ref,
            )?;
            continue;
        };
        let check = activity::ensure_active_status(conn, ancestor, now)?;
        let ancestor = check.member;

        let amount = crate::money::level_commission(input.base_amount, percent);

        if amount <= Decimal::ZERO {
            record_skip(
                conn,
                &mut outcome,
                &ancestor.id,
                &purchaser.id,
                level,
                &currency,
                "Zero commission amount",
                &event_ref,
            )?;
            continue;
        }

        if let Some(reason) = ineligibility_reason(&ancestor, level, now) {
            record_skip(
                conn,
                &mut outcome,
                &ancestor.id,
                &purchaser.id,
                level,
                &currency,
                reason,
                &event_ref,
            )?;
            continue;
        }

        let insert = ledger::insert_entry(
            conn,
            &ledger::LedgerEntryInput {
                member_id: &ancestor.id,
                source_member_id: &purchaser.id,
                level,
                amount,
                currency: &currency,
                status: ledger_status::PAID,
                reason: None,
                event_ref: &event_ref,
            },
        )?;
        let ledger_id = match insert {
            ledger::LedgerInsert::Inserted(id) => id,
            ledger::LedgerInsert::Duplicate => {
                outcome.skipped.push(SkippedCommission {
                    member_id: ancestor.id.clone(),
                    level,
                    reason: "Duplicate commission detected".to_string(),
                    event_ref,
                });
                continue;
            }
        };

        wallets::credit_referral_balance(conn, &ancestor.id, amount)?;
        let description = format!("Level {} commission from {}", level, purchaser.id);
        let wallet_transaction_id = wallets::create_commission_transaction(
            conn,
            &ancestor.id,
            amount,
            &currency,
            &event_ref,
            &description,
        )?;
        ledger::link_wallet_transaction(conn, &ledger_id, &wallet_transaction_id)?;

        info!(
            ancestor = %ancestor.id,
            level = level,
            amount = %amount,
            "Commission paid"
        );
        outcome.payouts.push(CommissionPayout {
            member_id: ancestor.id,
            level,
            amount,
            currency: currency.clone(),
            event_ref,
            wallet_transaction_id,
        });
    }

    Ok(outcome)
}

// Skipped rows always carry amount 0; the reason records why
#[allow(clippy::too_many_arguments)]
fn record_skip(
    conn: &mut SqliteConnection,
    outcome: &mut DistributionOutcome,
    member_id: &str,
    source_member_id: &str,
    level: i32,
    currency: &str,
    reason: &str,
    event_ref: &str,
) -> Result<(), MatrixError> {
    let insert = ledger::insert_entry(
        conn,
        &ledger::LedgerEntryInput {
            member_id,
            source_member_id,
            level,
            amount: Decimal::ZERO,
            currency,
            status: ledger_status::SKIPPED,
            reason: Some(reason),
            event_ref,
        },
    )?;
    let reason = match insert {
        ledger::LedgerInsert::Inserted(_) => reason.to_string(),
        ledger::LedgerInsert::Duplicate => "Duplicate commission detected".to_string(),
    };
    debug!(ancestor = %member_id, level = level, reason = %reason, "Commission skipped");
    outcome.skipped.push(SkippedCommission {
        member_id: member_id.to_string(),
        level,
        reason,
        event_ref: event_ref.to_string(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::members::{create_member, set_qualification_level, CreateMemberInput};
    use crate::db::schema_sql;
    use crate::engine::placement::place_member;
    use crate::money::parse_decimal;

    fn setup() -> (SqliteConnection, Config) {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        schema_sql::init_schema(&mut conn).unwrap();
        (conn, Config::default())
    }

    fn add(conn: &mut SqliteConnection, id: &str) {
        create_member(
            conn,
            &CreateMemberInput {
                id: id.into(),
                ..Default::default()
            },
        )
        .unwrap();
    }

    fn chain(conn: &mut SqliteConnection, config: &Config, ids: &[&str]) {
        let mut prev: Option<&str> = None;
        for id in ids {
            add(conn, id);
            place_member(conn, config, id, prev).unwrap();
            prev = Some(id);
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn purchase(purchaser: &str, amount: &str, tx: &str) -> DistributionInput {
        DistributionInput {
            purchaser_id: purchaser.into(),
            base_amount: dec(amount),
            transaction_ref: Some(tx.into()),
            ..Default::default()
        }
    }

    #[test]
    fn pays_qualified_parent_and_skips_unqualified_grandparent() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "b", "buyer"]);
        // b qualifies for level 1 only; a stays at tier 0
        set_qualification_level(&mut conn, "b", 1).unwrap();

        let outcome = distribute_commission(
            &mut conn,
            &config,
            &purchase("buyer", "1000", "tx-1"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.payouts.len(), 1);
        assert_eq!(outcome.payouts[0].member_id, "b");
        assert_eq!(outcome.payouts[0].level, 1);
        assert_eq!(outcome.payouts[0].amount, dec("100.00"));

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].member_id, "a");
        assert_eq!(outcome.skipped[0].level, 2);
        assert_eq!(outcome.skipped[0].reason, "Level not qualified");

        let wallet = wallets::get_wallet(&mut conn, "b").unwrap().unwrap();
        assert_eq!(parse_decimal(&wallet.referral_balance).unwrap(), dec("100.00"));
        assert!(wallets::get_wallet(&mut conn, "a").unwrap().is_none());

        // Ledger carries both outcomes, linked on the paid row
        let paid = ledger::list_for_member(&mut conn, "b", None, 10).unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].status, ledger_status::PAID);
        assert!(paid[0].wallet_transaction_id.is_some());
        let skipped = ledger::list_for_member(&mut conn, "a", None, 10).unwrap();
        assert_eq!(skipped[0].status, ledger_status::SKIPPED);
        assert_eq!(skipped[0].reason.as_deref(), Some("Level not qualified"));
        assert_eq!(parse_decimal(&skipped[0].amount).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn redelivery_does_not_double_pay() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "buyer"]);
        set_qualification_level(&mut conn, "a", 1).unwrap();

        let input = purchase("buyer", "1000", "tx-1");
        let first = distribute_commission(&mut conn, &config, &input, Utc::now()).unwrap();
        assert_eq!(first.payouts.len(), 1);

        let second = distribute_commission(&mut conn, &config, &input, Utc::now()).unwrap();
        assert!(second.payouts.is_empty());
        assert_eq!(second.skipped.len(), 1);
        assert_eq!(second.skipped[0].reason, "Duplicate commission detected");

        let wallet = wallets::get_wallet(&mut conn, "a").unwrap().unwrap();
        assert_eq!(parse_decimal(&wallet.referral_balance).unwrap(), dec("100.00"));
        assert_eq!(
            ledger::list_for_member(&mut conn, "a", None, 10).unwrap().len(),
            1
        );
    }

    #[test]
    fn lapsed_ancestor_is_skipped_with_reason() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "buyer"]);
        set_qualification_level(&mut conn, "a", 1).unwrap();
        diesel::update(
            crate::db::diesel_schema::members::table
                .filter(crate::db::diesel_schema::members::id.eq("a")),
        )
        .set(crate::db::diesel_schema::members::active_until.eq("2000-01-01T00:00:00Z"))
        .execute(&mut conn)
        .unwrap();

        let outcome = distribute_commission(
            &mut conn,
            &config,
            &purchase("buyer", "1000", "tx-1"),
            Utc::now(),
        )
        .unwrap();

        assert!(outcome.payouts.is_empty());
        assert_eq!(outcome.skipped[0].reason, "Ancestor inactive");
        // The refresh lapsed the ancestor as a side effect
        let a = members::require_member(&mut conn, "a").unwrap();
        assert_eq!(a.activity_status, activity_status::LAPSED);
    }

    #[test]
    fn zero_amount_levels_are_recorded_skipped() {
        let (mut conn, _) = setup();
        let config = Config {
            commission_percents: vec!["10".into(), "0".into()],
            commission_levels: 2,
            ..Config::default()
        };
        chain(&mut conn, &config, &["a", "b", "buyer"]);
        set_qualification_level(&mut conn, "b", 1).unwrap();
        set_qualification_level(&mut conn, "a", 2).unwrap();

        let outcome = distribute_commission(
            &mut conn,
            &config,
            &purchase("buyer", "1000", "tx-1"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.payouts.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, "Zero commission amount");
    }

    #[test]
    fn deleted_ancestor_row_is_recorded_missing() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "b", "buyer"]);
        set_qualification_level(&mut conn, "a", 2).unwrap();
        // The bundled SQLite is built with SQLITE_DEFAULT_FOREIGN_KEYS=1, so
        // the referencing slot row must go before the member row can.
        diesel::delete(
            crate::db::diesel_schema::available_slots::table
                .filter(crate::db::diesel_schema::available_slots::member_id.eq("b")),
        )
        .execute(&mut conn)
        .unwrap();
        diesel::delete(
            crate::db::diesel_schema::members::table
                .filter(crate::db::diesel_schema::members::id.eq("b")),
        )
        .execute(&mut conn)
        .unwrap();

        let outcome = distribute_commission(
            &mut conn,
            &config,
            &purchase("buyer", "1000", "tx-1"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].member_id, "b");
        assert_eq!(outcome.skipped[0].level, 1);
        assert_eq!(outcome.skipped[0].reason, "Ancestor missing");
        // Level 2 still pays out to the surviving grandparent
        assert_eq!(outcome.payouts.len(), 1);
        assert_eq!(outcome.payouts[0].member_id, "a");
        assert_eq!(outcome.payouts[0].amount, dec("50.00"));
    }

    #[test]
    fn missing_references_are_rejected_before_any_write() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "buyer"]);
        set_qualification_level(&mut conn, "a", 1).unwrap();

        let input = DistributionInput {
            purchaser_id: "buyer".into(),
            base_amount: dec("1000"),
            ..Default::default()
        };
        let result = distribute_commission(&mut conn, &config, &input, Utc::now());
        assert!(matches!(result, Err(MatrixError::InvalidInput(_))));
        assert!(
            ledger::list_for_member(&mut conn, "a", None, 10)
                .unwrap()
                .is_empty()
        );
        assert!(wallets::get_wallet(&mut conn, "a").unwrap().is_none());
    }

    #[test]
    fn purchase_ref_is_the_fallback_key() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "buyer"]);
        set_qualification_level(&mut conn, "a", 1).unwrap();

        let input = DistributionInput {
            purchaser_id: "buyer".into(),
            base_amount: dec("1000"),
            purchase_ref: Some("po-1".into()),
            ..Default::default()
        };
        let outcome = distribute_commission(&mut conn, &config, &input, Utc::now()).unwrap();
        assert_eq!(outcome.payouts.len(), 1);
        assert_eq!(outcome.payouts[0].event_ref, "commission:po-1:1:a");

        // A transaction ref takes precedence over the purchase ref
        let both = DistributionInput {
            transaction_ref: Some("tx-9".into()),
            ..input
        };
        let outcome = distribute_commission(&mut conn, &config, &both, Utc::now()).unwrap();
        assert_eq!(outcome.payouts[0].event_ref, "commission:tx-9:1:a");
    }

    #[test]
    fn non_positive_base_distributes_nothing() {
        let (mut conn, config) = setup();
        chain(&mut conn, &config, &["a", "buyer"]);

        let outcome = distribute_commission(
            &mut conn,
            &config,
            &purchase("buyer", "0", "tx-1"),
            Utc::now(),
        )
        .unwrap();
        assert!(outcome.payouts.is_empty());
        assert!(outcome.skipped.is_empty());
        assert!(
            ledger::list_for_member(&mut conn, "a", None, 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn full_default_cascade_totals() {
        let (mut conn, config) = setup();
        let ids = ["l8", "l7", "l6", "l5", "l4", "l3", "l2", "l1", "buyer"];
        chain(&mut conn, &config, &ids);
        for (i, id) in ids.iter().enumerate().take(8) {
            // l8 is level 8 from the buyer, l1 is level 1
            set_qualification_level(&mut conn, id, 8 - i as i32).unwrap();
        }

        let outcome = distribute_commission(
            &mut conn,
            &config,
            &purchase("buyer", "1000", "tx-1"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.payouts.len(), 8);
        assert!(outcome.skipped.is_empty());
        let expected = ["100.00", "50.00", "30.00", "20.00", "15.00", "10.00", "5.00", "2.50"];
        for (payout, want) in outcome.payouts.iter().zip(expected) {
            assert_eq!(payout.amount, dec(want), "level {}", payout.level);
        }
        let total: Decimal = outcome.payouts.iter().map(|p| p.amount).sum();
        assert_eq!(total, dec("232.50"));
    }
}
