//! Credit lots
//!
//! A lot is one purchase of prepaid consultation credits. One unit buys
//! thirty minutes of consultation. Lots are never deleted: an exhausted lot
//! keeps `remaining_units == 0` as a purchase record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CreditLotId, UserId, MINUTES_PER_CREDIT};
use crate::error::{CreditError, CreditResult};

/// A purchased batch of credit units
///
/// # Invariants
///
/// - `0 <= remaining_units <= total_units`
/// - `total_units > 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLot {
    pub id: CreditLotId,
    pub user_id: UserId,
    pub product_id: String,
    pub total_units: u32,
    pub remaining_units: u32,
    pub purchased_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CreditLot {
    /// Creates a full lot
    pub fn new(
        user_id: UserId,
        product_id: impl Into<String>,
        units: u32,
        purchased_at: DateTime<Utc>,
    ) -> CreditResult<Self> {
        if units == 0 {
            return Err(CreditError::invalid("a credit lot must hold at least one unit"));
        }
        Ok(Self {
            id: CreditLotId::new_v7(),
            user_id,
            product_id: product_id.into(),
            total_units: units,
            remaining_units: units,
            purchased_at,
            created_at: Utc::now(),
        })
    }

    pub fn used_units(&self) -> u32 {
        self.total_units - self.remaining_units
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_units == 0
    }

    /// Consultation minutes still available on this lot
    pub fn remaining_minutes(&self) -> u64 {
        u64::from(self.remaining_units) * u64::from(MINUTES_PER_CREDIT)
    }

    /// Ordering key for FIFO consumption: oldest purchase first, ties broken
    /// by creation time and then id so the order is total
    pub fn fifo_key(&self) -> (DateTime<Utc>, DateTime<Utc>, CreditLotId) {
        (self.purchased_at, self.created_at, self.id)
    }

    /// Deducts reserved units
    pub fn take(&mut self, units: u32) -> CreditResult<()> {
        if units > self.remaining_units {
            return Err(CreditError::LotInvariant {
                lot_id: self.id,
                message: format!("cannot take {} of {} remaining units", units, self.remaining_units),
            });
        }
        self.remaining_units -= units;
        Ok(())
    }

    /// Puts units back, e.g. on release or refund
    pub fn restore(&mut self, units: u32) -> CreditResult<()> {
        let restored = self
            .remaining_units
            .checked_add(units)
            .filter(|restored| *restored <= self.total_units)
            .ok_or_else(|| CreditError::LotInvariant {
                lot_id: self.id,
                message: format!(
                    "restoring {} units would exceed the lot total of {}",
                    units, self.total_units
                ),
            })?;
        self.remaining_units = restored;
        Ok(())
    }
}

/// Credit balance summary across all of a user's lots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreditBalance {
    pub total_units: u64,
    pub used_units: u64,
    pub remaining_units: u64,
}

impl CreditBalance {
    pub fn from_lots<'a>(lots: impl IntoIterator<Item = &'a CreditLot>) -> Self {
        lots.into_iter().fold(Self::default(), |acc, lot| Self {
            total_units: acc.total_units + u64::from(lot.total_units),
            used_units: acc.used_units + u64::from(lot.used_units()),
            remaining_units: acc.remaining_units + u64::from(lot.remaining_units),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(units: u32) -> CreditLot {
        CreditLot::new(UserId::new(), "pack-4", units, Utc::now()).unwrap()
    }

    #[test]
    fn test_new_lot_is_full() {
        let lot = lot(4);
        assert_eq!(lot.remaining_units, 4);
        assert_eq!(lot.used_units(), 0);
        assert_eq!(lot.remaining_minutes(), 120);
    }

    #[test]
    fn test_empty_lot_rejected() {
        assert!(matches!(
            CreditLot::new(UserId::new(), "pack-0", 0, Utc::now()),
            Err(CreditError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_take_and_restore_stay_within_bounds() {
        let mut lot = lot(3);
        lot.take(2).unwrap();
        assert_eq!(lot.remaining_units, 1);
        assert!(lot.take(2).is_err());
        assert_eq!(lot.remaining_units, 1);

        lot.restore(2).unwrap();
        assert_eq!(lot.remaining_units, 3);
        assert!(lot.restore(1).is_err());
        assert_eq!(lot.remaining_units, 3);
    }

    #[test]
    fn test_balance_summary() {
        let mut a = lot(4);
        a.take(3).unwrap();
        let b = lot(2);

        let balance = CreditBalance::from_lots([&a, &b]);
        assert_eq!(balance.total_units, 6);
        assert_eq!(balance.used_units, 3);
        assert_eq!(balance.remaining_units, 3);
    }
}
