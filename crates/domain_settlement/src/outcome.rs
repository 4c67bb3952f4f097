//! Outcome classification
//!
//! Decides, from how a session ended and how long it ran, how many of the
//! reserved credit units are consumed and how many go back to the customer.
//!
//! | end reason         | consumed                     | refunded             |
//! |--------------------|------------------------------|----------------------|
//! | NORMAL, TIMEOUT    | reserved                     | 0                    |
//! | NETWORK, < 600s    | 0                            | reserved             |
//! | NETWORK, >= 600s   | min(units for minutes, rsv)  | reserved - consumed  |
//! | ADMIN              | 0                            | reserved             |
//! | anything else      | reserved                     | 0                    |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::MINUTES_PER_CREDIT;

use crate::error::SettlementError;
use crate::session::{billable_minutes, EndReason};

/// Network drops shorter than this are fully refunded
pub const NETWORK_GRACE_SECS: u64 = 600;

/// How a session was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementType {
    Normal,
    Timeout,
    /// Network drop inside the grace window
    NetworkShort,
    /// Network drop after the grace window with some units returned
    NetworkPartial,
    /// Network drop after the grace window that used every reserved unit
    Network,
    AdminRefund,
    Other,
}

impl SettlementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementType::Normal => "NORMAL",
            SettlementType::Timeout => "TIMEOUT",
            SettlementType::NetworkShort => "NETWORK_SHORT",
            SettlementType::NetworkPartial => "NETWORK_PARTIAL",
            SettlementType::Network => "NETWORK",
            SettlementType::AdminRefund => "ADMIN_REFUND",
            SettlementType::Other => "OTHER",
        }
    }
}

impl fmt::Display for SettlementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementType {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(SettlementType::Normal),
            "TIMEOUT" => Ok(SettlementType::Timeout),
            "NETWORK_SHORT" => Ok(SettlementType::NetworkShort),
            "NETWORK_PARTIAL" => Ok(SettlementType::NetworkPartial),
            "NETWORK" => Ok(SettlementType::Network),
            "ADMIN_REFUND" => Ok(SettlementType::AdminRefund),
            "OTHER" => Ok(SettlementType::Other),
            other => Err(SettlementError::invalid(format!("unknown settlement type: {}", other))),
        }
    }
}

/// Split of the reserved units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub settlement_type: SettlementType,
    pub consumed: u32,
    pub refunded: u32,
}

impl SettlementOutcome {
    fn consume_all(settlement_type: SettlementType, reserved: u32) -> Self {
        Self { settlement_type, consumed: reserved, refunded: 0 }
    }

    fn refund_all(settlement_type: SettlementType, reserved: u32) -> Self {
        Self { settlement_type, consumed: 0, refunded: reserved }
    }
}

/// Credit units needed to cover `duration_sec`
pub fn units_for_duration(duration_sec: u64) -> u64 {
    billable_minutes(duration_sec).div_ceil(u64::from(MINUTES_PER_CREDIT))
}

/// Classifies a finished session
///
/// `consumed + refunded == reserved` for every input.
pub fn classify(reason: &EndReason, duration_sec: u64, reserved: u32) -> SettlementOutcome {
    match reason {
        EndReason::Normal => SettlementOutcome::consume_all(SettlementType::Normal, reserved),
        EndReason::Timeout => SettlementOutcome::consume_all(SettlementType::Timeout, reserved),
        EndReason::Network if duration_sec < NETWORK_GRACE_SECS => {
            SettlementOutcome::refund_all(SettlementType::NetworkShort, reserved)
        }
        EndReason::Network => {
            let consumed = units_for_duration(duration_sec).min(u64::from(reserved)) as u32;
            let refunded = reserved - consumed;
            let settlement_type = if refunded > 0 {
                SettlementType::NetworkPartial
            } else {
                SettlementType::Network
            };
            SettlementOutcome { settlement_type, consumed, refunded }
        }
        EndReason::Admin => SettlementOutcome::refund_all(SettlementType::AdminRefund, reserved),
        EndReason::Other(_) => SettlementOutcome::consume_all(SettlementType::Other, reserved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_and_timeout_consume_everything() {
        let normal = classify(&EndReason::Normal, 1800, 2);
        assert_eq!((normal.consumed, normal.refunded), (2, 0));
        assert_eq!(normal.settlement_type, SettlementType::Normal);

        let timeout = classify(&EndReason::Timeout, 10, 3);
        assert_eq!((timeout.consumed, timeout.refunded), (3, 0));
        assert_eq!(timeout.settlement_type, SettlementType::Timeout);
    }

    #[test]
    fn test_short_network_drop_refunds_everything() {
        let outcome = classify(&EndReason::Network, 300, 2);
        assert_eq!((outcome.consumed, outcome.refunded), (0, 2));
        assert_eq!(outcome.settlement_type, SettlementType::NetworkShort);

        let edge = classify(&EndReason::Network, 599, 2);
        assert_eq!(edge.settlement_type, SettlementType::NetworkShort);
    }

    #[test]
    fn test_long_network_drop_bills_used_units() {
        let outcome = classify(&EndReason::Network, 900, 3);
        assert_eq!((outcome.consumed, outcome.refunded), (1, 2));
        assert_eq!(outcome.settlement_type, SettlementType::NetworkPartial);

        // 31 minutes needs two units
        let outcome = classify(&EndReason::Network, 1860, 3);
        assert_eq!((outcome.consumed, outcome.refunded), (2, 1));
    }

    #[test]
    fn test_long_network_drop_capped_at_reserved() {
        let outcome = classify(&EndReason::Network, 7200, 2);
        assert_eq!((outcome.consumed, outcome.refunded), (2, 0));
        assert_eq!(outcome.settlement_type, SettlementType::Network);
    }

    #[test]
    fn test_admin_and_unknown_reasons() {
        let admin = classify(&EndReason::Admin, 1800, 2);
        assert_eq!((admin.consumed, admin.refunded), (0, 2));
        assert_eq!(admin.settlement_type, SettlementType::AdminRefund);

        let other = classify(&EndReason::Other("LEFT".into()), 60, 2);
        assert_eq!((other.consumed, other.refunded), (2, 0));
        assert_eq!(other.settlement_type, SettlementType::Other);
    }

    #[test]
    fn test_units_for_duration() {
        assert_eq!(units_for_duration(600), 1);
        assert_eq!(units_for_duration(1800), 1);
        assert_eq!(units_for_duration(1801), 2);
    }
}
