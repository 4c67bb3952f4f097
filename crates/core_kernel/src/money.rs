//! Cash amounts and commission arithmetic
//!
//! Cash is carried as signed `i64` in the smallest currency unit; there is no
//! floating point anywhere in the ledger. The only fractional quantity is the
//! platform commission rate, which is held as a `Decimal` so that the fee can
//! be floored exactly.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cash amount in the smallest currency unit
pub type Cash = i64;

/// Minutes of consultation covered by one credit unit
pub const MINUTES_PER_CREDIT: u32 = 30;

/// Default cash price of one consumed credit unit
pub const CREDIT_UNIT_PRICE: Cash = 15_000;

/// Default platform commission (20%)
pub const DEFAULT_COMMISSION_RATE: Decimal = dec!(0.20);

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid commission rate: {0} (must be between 0 and 1)")]
    InvalidRate(Decimal),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// Platform commission as a fraction of gross value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    /// Creates a rate from a fraction in `0..=1`
    pub fn new(fraction: Decimal) -> Result<Self, MoneyError> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(MoneyError::InvalidRate(fraction));
        }
        Ok(Self(fraction))
    }

    /// Creates a rate from a whole percentage (e.g. `20` for 20%)
    pub fn from_percent(percent: u32) -> Result<Self, MoneyError> {
        Self::new(Decimal::from(percent) / dec!(100))
    }

    pub fn fraction(&self) -> Decimal {
        self.0
    }

    /// Platform fee for a gross amount, floored to a whole currency unit
    pub fn fee_for(&self, gross: Cash) -> Result<Cash, MoneyError> {
        if gross < 0 {
            return Err(MoneyError::InvalidAmount(format!(
                "gross amount must not be negative: {}",
                gross
            )));
        }
        (Decimal::from(gross) * self.0)
            .floor()
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self(DEFAULT_COMMISSION_RATE)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * dec!(100)).normalize())
    }
}

/// A gross amount split into platform fee and counselor earning
///
/// `platform_fee + counselor_earning == gross` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSplit {
    pub gross: Cash,
    pub platform_fee: Cash,
    pub counselor_earning: Cash,
}

impl EarningsSplit {
    /// Splits `units × unit_price` using the given commission rate
    pub fn for_units(units: u32, unit_price: Cash, rate: CommissionRate) -> Result<Self, MoneyError> {
        let gross = unit_price
            .checked_mul(Cash::from(units))
            .ok_or(MoneyError::Overflow)?;
        let platform_fee = rate.fee_for(gross)?;

        Ok(Self {
            gross,
            platform_fee,
            counselor_earning: gross - platform_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_is_twenty_percent() {
        assert_eq!(CommissionRate::default().fraction(), dec!(0.20));
    }

    #[test]
    fn test_fee_is_floored() {
        let rate = CommissionRate::default();
        assert_eq!(rate.fee_for(99).unwrap(), 19);
    }

    #[test]
    fn test_split_for_two_units() {
        let split = EarningsSplit::for_units(2, CREDIT_UNIT_PRICE, CommissionRate::default()).unwrap();
        assert_eq!(split.gross, 30_000);
        assert_eq!(split.platform_fee, 6_000);
        assert_eq!(split.counselor_earning, 24_000);
    }

    #[test]
    fn test_rate_out_of_range() {
        assert!(CommissionRate::new(dec!(1.5)).is_err());
        assert!(CommissionRate::from_percent(101).is_err());
    }
}
