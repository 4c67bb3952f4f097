//! Per-session settlement record

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    BookingId, Cash, CommissionRate, CounselorId, SessionId, SettlementTransactionId, UserId,
};

use crate::outcome::SettlementType;

/// Immutable result of settling one session
///
/// # Invariants
///
/// - at most one per `session_id`
/// - `credits_consumed + credits_refunded == credits_reserved`
/// - `counselor_earning + platform_fee == credits_consumed * unit price`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTransaction {
    pub id: SettlementTransactionId,
    pub session_id: SessionId,
    pub booking_id: BookingId,
    pub customer_id: UserId,
    pub counselor_id: CounselorId,
    pub credits_reserved: u32,
    pub credits_consumed: u32,
    pub credits_refunded: u32,
    pub actual_duration_sec: u64,
    pub settlement_type: SettlementType,
    pub counselor_earning: Cash,
    pub platform_fee: Cash,
    /// Rate in force when the session was settled
    pub commission_rate: CommissionRate,
    /// First day of the monthly settlement this session was folded into
    pub period_start: NaiveDate,
    pub settled_at: DateTime<Utc>,
}

impl SettlementTransaction {
    pub fn gross_amount(&self) -> Cash {
        self.counselor_earning + self.platform_fee
    }
}
