//! Custom Test Assertions
//!
//! Invariant checks with messages that name the offending row.

use core_kernel::{Cash, CommissionRate, UserId};
use domain_credit::{CreditLot, CreditUsageLog};
use domain_ledger::{CashTransaction, LedgerService};
use domain_settlement::{CounselorSettlement, SettlementTransaction};

/// Asserts that the wallet balance equals the replayed journal and every
/// `balance_after` snapshot matches the running sum
pub async fn assert_ledger_consistent(ledger: &LedgerService, user_id: UserId) {
    let audit = ledger
        .audit_balance(user_id)
        .await
        .expect("Failed to audit balance");
    assert!(
        audit.is_consistent(),
        "Ledger inconsistent for {}: wallet={}, replayed={}, snapshot mismatches={}",
        user_id,
        audit.wallet_balance,
        audit.replayed_balance,
        audit.snapshot_mismatches
    );
    assert!(audit.wallet_balance >= 0, "Negative balance for {}", user_id);
}

/// Asserts that a journal slice chains from `opening` without going negative
///
/// # Panics
///
/// Panics on the first transaction whose `balance_after` does not follow
pub fn assert_journal_chain(opening: Cash, transactions: &[CashTransaction]) {
    let mut running = opening;
    for tx in transactions {
        running += tx.amount;
        assert_eq!(
            tx.balance_after, running,
            "Transaction {} ({}) records balance {} but the running sum is {}",
            tx.id, tx.idempotency_key, tx.balance_after, running
        );
        assert!(running >= 0, "Transaction {} drives the balance negative", tx.id);
    }
}

/// Asserts `0 <= remaining <= total` for every lot
pub fn assert_lot_invariants(lots: &[CreditLot]) {
    for lot in lots {
        assert!(lot.total_units > 0, "Lot {} is empty", lot.id);
        assert!(
            lot.remaining_units <= lot.total_units,
            "Lot {} has {} of {} units remaining",
            lot.id,
            lot.remaining_units,
            lot.total_units
        );
    }
}

/// Asserts that lot usage is fully explained by the usage logs
///
/// Each lot's used units must equal the units its logs still hold
/// (reserved, or consumed after refunds).
pub fn assert_lots_match_usage(lots: &[CreditLot], logs: &[CreditUsageLog]) {
    for lot in lots {
        let held: u32 = logs
            .iter()
            .filter(|log| log.credit_id == lot.id)
            .map(|log| log.consumed_units())
            .sum();
        assert_eq!(
            lot.used_units(),
            held,
            "Lot {} has {} used units but its logs hold {}",
            lot.id,
            lot.used_units(),
            held
        );
    }
}

/// Asserts credit conservation and the commission split on one settlement
pub fn assert_settlement_conserves(tx: &SettlementTransaction, unit_price: Cash) {
    assert_eq!(
        tx.credits_consumed + tx.credits_refunded,
        tx.credits_reserved,
        "Settlement {} does not conserve credits",
        tx.id
    );
    assert_eq!(
        tx.gross_amount(),
        Cash::from(tx.credits_consumed) * unit_price,
        "Settlement {} gross does not price the consumed units",
        tx.id
    );
    assert_split(tx.gross_amount(), tx.platform_fee, tx.counselor_earning, tx.commission_rate);
}

/// Asserts fee = floor(gross * rate) and earning = gross - fee
pub fn assert_split(gross: Cash, fee: Cash, earning: Cash, rate: CommissionRate) {
    let expected_fee = rate.fee_for(gross).expect("fee overflow");
    assert_eq!(fee, expected_fee, "Fee on {} at {} should be {}", gross, rate, expected_fee);
    assert_eq!(earning, gross - fee, "Earning should be gross minus fee");
}

/// Asserts that every usage log of a settled booking is reconciled and the
/// refunds add up to the settlement's refunded units
pub fn assert_usage_reconciled(tx: &SettlementTransaction, logs: &[CreditUsageLog]) {
    assert!(!logs.is_empty(), "Booking {} has no usage logs", tx.booking_id);
    for log in logs {
        assert!(
            !log.is_reserved(),
            "Usage log {} of booking {} is still reserved",
            log.id,
            tx.booking_id
        );
    }
    let refunded: u32 = logs.iter().map(|log| log.refunded_units).sum();
    assert_eq!(refunded, tx.credits_refunded, "Refunds across logs disagree with the settlement");
}

/// Asserts that a monthly aggregate equals the sum of its sessions
pub fn assert_aggregate_matches(month: &CounselorSettlement, sessions: &[SettlementTransaction]) {
    let sessions_in_month: Vec<&SettlementTransaction> = sessions
        .iter()
        .filter(|tx| tx.counselor_id == month.counselor_id && tx.period_start == month.period.start())
        .collect();

    let gross: Cash = sessions_in_month.iter().map(|tx| tx.gross_amount()).sum();
    let fee: Cash = sessions_in_month.iter().map(|tx| tx.platform_fee).sum();
    let earning: Cash = sessions_in_month.iter().map(|tx| tx.counselor_earning).sum();

    assert_eq!(
        month.total_sessions as usize,
        sessions_in_month.len(),
        "Session count mismatch for {}",
        month.period
    );
    assert_eq!(month.gross_amount, gross, "Gross mismatch for {}", month.period);
    assert_eq!(month.commission_amount, fee, "Commission mismatch for {}", month.period);
    assert_eq!(month.net_amount, earning, "Net mismatch for {}", month.period);
    assert_eq!(month.net_amount, month.gross_amount - month.commission_amount);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::CreditLotBuilder;
    use core_kernel::BookingId;

    #[test]
    fn test_split_assertion_accepts_floor() {
        assert_split(45_000, 9_000, 36_000, CommissionRate::default());
    }

    #[test]
    #[should_panic(expected = "Fee on")]
    fn test_split_assertion_rejects_rounding_up() {
        let rate = CommissionRate::from_percent(15).unwrap();
        // floor(15_001 * 0.15) = 2_250
        assert_split(15_001, 2_251, 12_750, rate);
    }

    #[test]
    fn test_lots_match_usage() {
        let lot = CreditLotBuilder::new().with_units(3).with_remaining(1).build();
        let log = CreditUsageLog::reserved(lot.id, BookingId::new(), 2);
        assert_lots_match_usage(&[lot], &[log]);
    }

    #[test]
    #[should_panic(expected = "used units")]
    fn test_lots_match_usage_detects_leak() {
        let lot = CreditLotBuilder::new().with_units(3).with_remaining(0).build();
        let log = CreditUsageLog::reserved(lot.id, BookingId::new(), 2);
        assert_lots_match_usage(&[lot], &[log]);
    }
}
