//! Usage-log reconciliation
//!
//! Distributes a session's refunded units over the booking's usage logs.
//! Refunds unwind in reverse reservation order: reservation took units from
//! the oldest lots first, so the newest lots get their units back first and
//! the consumed units stay on the oldest lots.

use domain_credit::CreditUsageLog;

/// Refund units per log, index-aligned with `logs`
///
/// `logs` must be in reservation order. Returns `None` if the logs hold
/// fewer units than `refunded`.
pub fn refund_per_log(logs: &[CreditUsageLog], refunded: u32) -> Option<Vec<u32>> {
    let mut refunds = vec![0; logs.len()];
    let mut refund_remaining = refunded;

    for (index, log) in logs.iter().enumerate().rev() {
        if refund_remaining == 0 {
            break;
        }
        let refund_from_this = refund_remaining.min(log.units_used);
        refunds[index] = refund_from_this;
        refund_remaining -= refund_from_this;
    }

    (refund_remaining == 0).then_some(refunds)
}
