//! Finished consultation sessions as reported by the session runtime

use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{BookingId, SessionId};
use crate::error::{SettlementError, SettlementResult};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EndReason {
    Normal,
    Timeout,
    Network,
    Admin,
    /// Any reason the settlement rules do not know about
    Other(String),
}

impl EndReason {
    pub fn as_str(&self) -> &str {
        match self {
            EndReason::Normal => "NORMAL",
            EndReason::Timeout => "TIMEOUT",
            EndReason::Network => "NETWORK",
            EndReason::Admin => "ADMIN",
            EndReason::Other(reason) => reason,
        }
    }
}

impl From<&str> for EndReason {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => EndReason::Normal,
            "TIMEOUT" => EndReason::Timeout,
            "NETWORK" => EndReason::Network,
            "ADMIN" => EndReason::Admin,
            _ => EndReason::Other(s.to_string()),
        }
    }
}

impl From<String> for EndReason {
    fn from(s: String) -> Self {
        EndReason::from(s.as_str())
    }
}

impl From<EndReason> for String {
    fn from(reason: EndReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consultation session that has ended and awaits settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedSession {
    pub session_id: SessionId,
    /// The booking whose credit reservation the session used
    pub booking_id: BookingId,
    pub duration_sec: i64,
    pub end_reason: EndReason,
}

impl FinishedSession {
    pub fn new(
        session_id: SessionId,
        booking_id: BookingId,
        duration_sec: i64,
        end_reason: impl Into<EndReason>,
    ) -> Self {
        Self {
            session_id,
            booking_id,
            duration_sec,
            end_reason: end_reason.into(),
        }
    }

    /// Duration in whole seconds, rejecting negative values
    pub fn checked_duration(&self) -> SettlementResult<u64> {
        u64::try_from(self.duration_sec).map_err(|_| {
            SettlementError::invalid(format!(
                "session {} has a negative duration: {}s",
                self.session_id, self.duration_sec
            ))
        })
    }
}

/// Whole minutes covering `duration_sec`, rounded up
pub fn billable_minutes(duration_sec: u64) -> u64 {
    duration_sec.div_ceil(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_parsing() {
        assert_eq!(EndReason::from("NORMAL"), EndReason::Normal);
        assert_eq!(EndReason::from("network"), EndReason::Network);
        assert_eq!(EndReason::from("ADMIN"), EndReason::Admin);
        assert_eq!(
            EndReason::from("COUNSELOR_LEFT"),
            EndReason::Other("COUNSELOR_LEFT".to_string())
        );
    }

    #[test]
    fn test_end_reason_serializes_as_string() {
        let json = serde_json::to_string(&EndReason::Timeout).unwrap();
        assert_eq!(json, "\"TIMEOUT\"");
        let back: EndReason = serde_json::from_str("\"NETWORK\"").unwrap();
        assert_eq!(back, EndReason::Network);
    }

    #[test]
    fn test_billable_minutes_round_up() {
        assert_eq!(billable_minutes(0), 0);
        assert_eq!(billable_minutes(1), 1);
        assert_eq!(billable_minutes(60), 1);
        assert_eq!(billable_minutes(61), 2);
        assert_eq!(billable_minutes(1800), 30);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let session = FinishedSession::new(SessionId::new(), BookingId::new(), -1, "NORMAL");
        assert!(matches!(
            session.checked_duration(),
            Err(SettlementError::InvalidArgument(_))
        ));
    }
}
