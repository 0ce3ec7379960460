//! Money helpers
//!
//! Amounts and percents are stored as decimal TEXT columns and carried
//! through arithmetic as `rust_decimal::Decimal`. Rounding is always
//! half-up to two decimal places so repeated cascades never
//! systematically underpay.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::MatrixError;

/// Round a money amount half-up to two decimal places
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a decimal TEXT column value
pub fn parse_decimal(raw: &str) -> Result<Decimal, MatrixError> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| MatrixError::Internal(format!("Bad decimal '{}': {}", raw, e)))
}

/// Parse a configured percent; negative values are rejected
pub fn parse_percent(raw: &str) -> Result<Decimal, MatrixError> {
    let value = raw
        .trim()
        .parse::<Decimal>()
        .map_err(|e| MatrixError::InvalidInput(format!("Bad percent '{}': {}", raw, e)))?;
    if value.is_sign_negative() {
        return Err(MatrixError::InvalidInput(format!(
            "Negative percent '{}'",
            raw
        )));
    }
    Ok(value)
}

/// Commission for one level: base * percent / 100, rounded to money
pub fn level_commission(base: Decimal, percent: Decimal) -> Decimal {
    round_money(base * percent / Decimal::from(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_money(dec("1.005")), dec("1.01"));
        assert_eq!(round_money(dec("1.004")), dec("1.00"));
        assert_eq!(round_money(dec("2.675")), dec("2.68"));
    }

    #[test]
    fn commission_per_level() {
        let base = dec("1000");
        assert_eq!(level_commission(base, dec("10")), dec("100.00"));
        assert_eq!(level_commission(base, dec("1.5")), dec("15.00"));
        assert_eq!(level_commission(base, dec("0.25")), dec("2.50"));
        assert_eq!(level_commission(dec("99.99"), dec("0.25")), dec("0.25"));
    }

    #[test]
    fn percent_validation() {
        assert_eq!(parse_percent(" 2.5 ").unwrap(), dec("2.5"));
        assert!(parse_percent("-1").is_err());
        assert!(parse_percent("ten").is_err());
    }
}
