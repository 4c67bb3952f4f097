//! Property-Based Test Generators
//!
//! Proptest strategies that respect the domain's input rules.

use core_kernel::{Cash, CommissionRate};
use domain_settlement::EndReason;
use proptest::prelude::*;

/// Positive cash amounts up to one million
pub fn cash_amount_strategy() -> impl Strategy<Value = Cash> {
    1i64..1_000_000i64
}

/// Signed, non-zero adjustments
pub fn adjustment_strategy() -> impl Strategy<Value = Cash> {
    prop_oneof![-500_000i64..0i64, 1i64..500_000i64]
}

/// Credit units in a single lot or reservation
pub fn unit_count_strategy() -> impl Strategy<Value = u32> {
    1u32..=8u32
}

/// Lot sizes for a customer who bought several packs
pub fn lot_sizes_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..=5u32, 1..=5)
}

/// Session length in seconds, up to four hours
pub fn duration_strategy() -> impl Strategy<Value = i64> {
    0i64..=4 * 3600
}

/// Every end reason, including one the rules do not know
pub fn end_reason_strategy() -> impl Strategy<Value = EndReason> {
    prop_oneof![
        Just(EndReason::Normal),
        Just(EndReason::Timeout),
        Just(EndReason::Network),
        Just(EndReason::Admin),
        Just(EndReason::Other("CUSTOMER_LEFT".to_string())),
    ]
}

/// Whole-percent commission rates from 0% to 100%
pub fn commission_rate_strategy() -> impl Strategy<Value = CommissionRate> {
    (0u32..=100u32).prop_map(|percent| CommissionRate::from_percent(percent).unwrap())
}

/// A session scenario: the lots a customer holds, how many units the
/// booking reserves (never more than they hold), duration and end reason
pub fn session_scenario_strategy() -> impl Strategy<Value = (Vec<u32>, u32, i64, EndReason)> {
    lot_sizes_strategy().prop_flat_map(|lots| {
        let held: u32 = lots.iter().sum();
        (
            Just(lots),
            1u32..=held,
            duration_strategy(),
            end_reason_strategy(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn scenario_never_reserves_more_than_held((lots, reserved, duration, _reason) in session_scenario_strategy()) {
            let held: u32 = lots.iter().sum();
            prop_assert!(reserved >= 1);
            prop_assert!(reserved <= held);
            prop_assert!(duration >= 0);
        }

        #[test]
        fn adjustments_are_never_zero(amount in adjustment_strategy()) {
            prop_assert_ne!(amount, 0);
        }
    }
}
