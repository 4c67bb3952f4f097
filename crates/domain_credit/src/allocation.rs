//! FIFO allocation of units across lots
//!
//! Pure planning step used by reservation: given the owner's lots, decide how
//! many units to take from each, oldest purchase first. Either the whole
//! request is covered or nothing is planned.

use core_kernel::CreditLotId;

use crate::error::{CreditError, CreditResult};
use crate::lot::CreditLot;

/// Units to take from one lot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub lot_id: CreditLotId,
    pub units: u32,
}

/// Plans a FIFO reservation of `units`
///
/// Lots with no remaining units are skipped. The input order does not
/// matter; lots are walked by [`CreditLot::fifo_key`].
pub fn allocate_fifo(lots: &[CreditLot], units: u32) -> CreditResult<Vec<Allocation>> {
    if units == 0 {
        return Err(CreditError::invalid("units must be positive"));
    }

    let available: u64 = lots.iter().map(|lot| u64::from(lot.remaining_units)).sum();
    if available < u64::from(units) {
        return Err(CreditError::InsufficientCredits {
            requested: units,
            available,
        });
    }

    let mut ordered: Vec<&CreditLot> = lots.iter().filter(|lot| !lot.is_exhausted()).collect();
    ordered.sort_by_key(|lot| lot.fifo_key());

    let mut still_needed = units;
    let mut plan = Vec::new();
    for lot in ordered {
        if still_needed == 0 {
            break;
        }
        let take = lot.remaining_units.min(still_needed);
        plan.push(Allocation { lot_id: lot.id, units: take });
        still_needed -= take;
    }
    Ok(plan)
}
