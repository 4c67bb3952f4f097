//! Credit usage logs
//!
//! A usage log links units taken from one lot to one booking. Reservation
//! writes one `RESERVED` log per lot touched; settlement later marks each log
//! consumed, released or partially refunded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BookingId, CreditLotId, UsageLogId};
use crate::error::CreditError;

/// Lifecycle of a usage log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageStatus {
    Reserved,
    Consumed,
    Released,
    PartialRefund,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Reserved => "RESERVED",
            UsageStatus::Consumed => "CONSUMED",
            UsageStatus::Released => "RELEASED",
            UsageStatus::PartialRefund => "PARTIAL_REFUND",
        }
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageStatus {
    type Err = CreditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESERVED" => Ok(UsageStatus::Reserved),
            "CONSUMED" => Ok(UsageStatus::Consumed),
            "RELEASED" => Ok(UsageStatus::Released),
            "PARTIAL_REFUND" => Ok(UsageStatus::PartialRefund),
            other => Err(CreditError::invalid(format!("unknown usage status: {}", other))),
        }
    }
}

/// Units of one lot committed to one booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditUsageLog {
    pub id: UsageLogId,
    pub credit_id: CreditLotId,
    pub booking_id: BookingId,
    pub units_used: u32,
    pub status: UsageStatus,
    /// Never exceeds `units_used`
    pub refunded_units: u32,
    pub used_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub actual_minutes: Option<u32>,
}

impl CreditUsageLog {
    pub fn reserved(credit_id: CreditLotId, booking_id: BookingId, units: u32) -> Self {
        Self {
            id: UsageLogId::new_v7(),
            credit_id,
            booking_id,
            units_used: units,
            status: UsageStatus::Reserved,
            refunded_units: 0,
            used_at: Utc::now(),
            consumed_at: None,
            actual_minutes: None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.status == UsageStatus::Reserved
    }

    /// Units that end up consumed once the log is reconciled
    pub fn consumed_units(&self) -> u32 {
        self.units_used - self.refunded_units
    }

    /// Reconciles a reserved log after the session ended
    ///
    /// The resulting status follows from how much of the log is refunded:
    /// nothing is `CONSUMED`, everything is `RELEASED`, anything in between
    /// is `PARTIAL_REFUND`.
    pub fn settle(
        &mut self,
        refunded_units: u32,
        actual_minutes: u32,
        at: DateTime<Utc>,
    ) -> Result<(), CreditError> {
        if !self.is_reserved() {
            return Err(CreditError::AlreadySettled(self.booking_id));
        }
        if refunded_units > self.units_used {
            return Err(CreditError::invalid(format!(
                "cannot refund {} of {} units on usage log {}",
                refunded_units, self.units_used, self.id
            )));
        }

        self.status = if refunded_units == 0 {
            UsageStatus::Consumed
        } else if refunded_units == self.units_used {
            UsageStatus::Released
        } else {
            UsageStatus::PartialRefund
        };
        self.refunded_units = refunded_units;
        self.actual_minutes = Some(actual_minutes);
        self.consumed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(units: u32) -> CreditUsageLog {
        CreditUsageLog::reserved(CreditLotId::new(), BookingId::new(), units)
    }

    #[test]
    fn test_settle_statuses() {
        let now = Utc::now();

        let mut consumed = log(2);
        consumed.settle(0, 30, now).unwrap();
        assert_eq!(consumed.status, UsageStatus::Consumed);

        let mut released = log(2);
        released.settle(2, 5, now).unwrap();
        assert_eq!(released.status, UsageStatus::Released);
        assert_eq!(released.consumed_units(), 0);

        let mut partial = log(3);
        partial.settle(2, 15, now).unwrap();
        assert_eq!(partial.status, UsageStatus::PartialRefund);
        assert_eq!(partial.refunded_units, 2);
        assert_eq!(partial.actual_minutes, Some(15));
        assert_eq!(partial.consumed_at, Some(now));
    }

    #[test]
    fn test_settle_twice_rejected() {
        let mut log = log(1);
        log.settle(0, 30, Utc::now()).unwrap();
        assert!(matches!(
            log.settle(0, 30, Utc::now()),
            Err(CreditError::AlreadySettled(_))
        ));
    }

    #[test]
    fn test_over_refund_rejected() {
        let mut log = log(1);
        assert!(log.settle(2, 0, Utc::now()).is_err());
        assert!(log.is_reserved());
    }

    #[test]
    fn test_status_strings() {
        for status in [
            UsageStatus::Reserved,
            UsageStatus::Consumed,
            UsageStatus::Released,
            UsageStatus::PartialRefund,
        ] {
            assert_eq!(status.as_str().parse::<UsageStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&UsageStatus::PartialRefund).unwrap(),
            "\"PARTIAL_REFUND\""
        );
    }
}
