//! Monthly counselor settlement
//!
//! One running aggregate per counselor and calendar month. Sessions are
//! folded in while the month is `PENDING`; an operator then confirms the
//! statement and finally marks it paid.
//!
//! ```text
//! PENDING ──confirm──► CONFIRMED ──mark_paid──► PAID
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Cash, CommissionRate, CounselorId, CounselorSettlementId, SettlementPeriod};

use crate::error::{SettlementError, SettlementResult};
use crate::session::billable_minutes;
use crate::settlement::SettlementTransaction;

/// Payout workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Paid,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Confirmed => "CONFIRMED",
            SettlementStatus::Paid => "PAID",
        }
    }

    pub fn can_transition_to(&self, target: SettlementStatus) -> bool {
        matches!(
            (self, target),
            (SettlementStatus::Pending, SettlementStatus::Confirmed)
                | (SettlementStatus::Confirmed, SettlementStatus::Paid)
        )
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SettlementStatus::Pending),
            "CONFIRMED" => Ok(SettlementStatus::Confirmed),
            "PAID" => Ok(SettlementStatus::Paid),
            other => Err(SettlementError::invalid(format!("unknown settlement status: {}", other))),
        }
    }
}

/// Running monthly totals for one counselor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselorSettlement {
    pub id: CounselorSettlementId,
    pub counselor_id: CounselorId,
    pub period: SettlementPeriod,
    pub total_sessions: u32,
    pub total_duration_min: u64,
    pub gross_amount: Cash,
    pub commission_amount: Cash,
    pub net_amount: Cash,
    pub status: SettlementStatus,
    /// Rate in force when the month was opened
    pub commission_rate: CommissionRate,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CounselorSettlement {
    /// Opens an empty `PENDING` month
    pub fn open(counselor_id: CounselorId, period: SettlementPeriod, commission_rate: CommissionRate) -> Self {
        let now = Utc::now();
        Self {
            id: CounselorSettlementId::new_v7(),
            counselor_id,
            period,
            total_sessions: 0,
            total_duration_min: 0,
            gross_amount: 0,
            commission_amount: 0,
            net_amount: 0,
            status: SettlementStatus::Pending,
            commission_rate,
            confirmed_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds one settled session into the totals
    pub fn record(&mut self, transaction: &SettlementTransaction) -> SettlementResult<()> {
        if self.status != SettlementStatus::Pending {
            return Err(SettlementError::PeriodClosed {
                counselor_id: self.counselor_id,
                period: self.period.to_string(),
                status: self.status,
            });
        }

        let overflow = || SettlementError::Money(core_kernel::MoneyError::Overflow);
        let total_sessions = self.total_sessions.checked_add(1).ok_or_else(overflow)?;
        let total_duration_min = self
            .total_duration_min
            .checked_add(billable_minutes(transaction.actual_duration_sec))
            .ok_or_else(overflow)?;
        let gross_amount = self
            .gross_amount
            .checked_add(transaction.gross_amount())
            .ok_or_else(overflow)?;
        let commission_amount = self
            .commission_amount
            .checked_add(transaction.platform_fee)
            .ok_or_else(overflow)?;
        let net_amount = self
            .net_amount
            .checked_add(transaction.counselor_earning)
            .ok_or_else(overflow)?;

        self.total_sessions = total_sessions;
        self.total_duration_min = total_duration_min;
        self.gross_amount = gross_amount;
        self.commission_amount = commission_amount;
        self.net_amount = net_amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn confirm(&mut self, at: DateTime<Utc>) -> SettlementResult<()> {
        self.transition(SettlementStatus::Confirmed)?;
        self.confirmed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> SettlementResult<()> {
        self.transition(SettlementStatus::Paid)?;
        self.paid_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    fn transition(&mut self, target: SettlementStatus) -> SettlementResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(SettlementError::InvalidStateTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}
