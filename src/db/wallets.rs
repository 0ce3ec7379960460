//! Wallet-ledger primitives consumed by the commission engine
//!
//! Balances are decimal TEXT columns; increments are read-modify-write
//! and rely on the enclosing write transaction for atomicity.

use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::diesel_schema::{wallet_transactions, wallets};
use super::models::{current_timestamp, NewWallet, NewWalletTransaction, Wallet, WalletTransaction};
use crate::error::MatrixError;
use crate::money::parse_decimal;

/// Get a member's wallet, if one exists yet
pub fn get_wallet(
    conn: &mut SqliteConnection,
    member_id: &str,
) -> Result<Option<Wallet>, MatrixError> {
    wallets::table
        .filter(wallets::member_id.eq(member_id))
        .first(conn)
        .optional()
        .map_err(|e| MatrixError::Internal(format!("Wallet query failed: {}", e)))
}

/// Increment the referral (secondary) balance, creating the wallet on
/// first credit
pub fn credit_referral_balance(
    conn: &mut SqliteConnection,
    member_id: &str,
    amount: Decimal,
) -> Result<(), MatrixError> {
    let now = current_timestamp();
    match get_wallet(conn, member_id)? {
        Some(wallet) => {
            let balance = parse_decimal(&wallet.referral_balance)? + amount;
            diesel::update(wallets::table.filter(wallets::member_id.eq(member_id)))
                .set((
                    wallets::referral_balance.eq(balance.to_string()),
                    wallets::updated_at.eq(&now),
                ))
                .execute(conn)
                .map_err(|e| MatrixError::Internal(format!("Wallet update failed: {}", e)))?;
        }
        None => {
            let row = NewWallet {
                member_id,
                main_balance: "0",
                referral_balance: &amount.to_string(),
                updated_at: &now,
            };
            diesel::insert_into(wallets::table)
                .values(&row)
                .execute(conn)
                .map_err(|e| MatrixError::Internal(format!("Wallet insert failed: {}", e)))?;
        }
    }
    Ok(())
}

/// Create the wallet transaction linked from a PAID ledger row
pub fn create_commission_transaction(
    conn: &mut SqliteConnection,
    member_id: &str,
    amount: Decimal,
    currency: &str,
    reference_id: &str,
    description: &str,
) -> Result<String, MatrixError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let amount_text = amount.to_string();
    let row = NewWalletTransaction {
        id: &id,
        member_id,
        tx_type: "COMMISSION",
        status: "SUCCESS",
        provider: "SYSTEM",
        amount: &amount_text,
        currency,
        wallet_to: Some("REFERRAL"),
        reference_id: Some(reference_id),
        description: Some(description),
        created_at: &now,
    };

    diesel::insert_into(wallet_transactions::table)
        .values(&row)
        .execute(conn)
        .map_err(|e| MatrixError::Internal(format!("Transaction insert failed: {}", e)))?;
    Ok(id)
}

/// Wallet transactions for a member, newest first
pub fn list_transactions(
    conn: &mut SqliteConnection,
    member_id: &str,
    limit: i64,
) -> Result<Vec<WalletTransaction>, MatrixError> {
    wallet_transactions::table
        .filter(wallet_transactions::member_id.eq(member_id))
        .order(wallet_transactions::created_at.desc())
        .limit(limit)
        .load(conn)
        .map_err(|e| MatrixError::Internal(format!("Transaction query failed: {}", e)))
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

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn credit_creates_then_increments() {
        let mut conn = setup();
        credit_referral_balance(&mut conn, "m-1", dec("100.00")).unwrap();
        credit_referral_balance(&mut conn, "m-1", dec("15.50")).unwrap();

        let wallet = get_wallet(&mut conn, "m-1").unwrap().unwrap();
        assert_eq!(parse_decimal(&wallet.referral_balance).unwrap(), dec("115.50"));
        assert_eq!(parse_decimal(&wallet.main_balance).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn commission_transaction_recorded() {
        let mut conn = setup();
        let id = create_commission_transaction(
            &mut conn,
            "m-1",
            dec("100.00"),
            "INR",
            "commission:tx:1:m-1",
            "Level 1 commission from buyer",
        )
        .unwrap();

        let txs = list_transactions(&mut conn, "m-1", 10).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, id);
        assert_eq!(txs[0].tx_type, "COMMISSION");
        assert_eq!(txs[0].wallet_to.as_deref(), Some("REFERRAL"));
    }
}
