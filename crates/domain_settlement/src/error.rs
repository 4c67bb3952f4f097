//! Settlement domain errors

use core_kernel::{BookingId, CounselorId, MoneyError, PortError, TemporalError};
use domain_credit::CreditError;
use thiserror::Error;

use crate::counselor::SettlementStatus;

/// Errors that can occur while settling sessions or running the payout workflow
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A booking, credit lot or monthly settlement does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The booking's usage logs disagree with its reserved credit count
    #[error("Credit conservation violated for booking {booking_id}: {message}")]
    ConservationViolation { booking_id: BookingId, message: String },

    #[error("Invalid settlement status transition from {from} to {to}")]
    InvalidStateTransition {
        from: SettlementStatus,
        to: SettlementStatus,
    },

    /// The month's settlement was already confirmed and can take no more sessions
    #[error("Settlement for {counselor_id} in {period} is {status}")]
    PeriodClosed {
        counselor_id: CounselorId,
        period: String,
        status: SettlementStatus,
    },

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    #[error("Credit error: {0}")]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Store(#[from] PortError),
}

impl SettlementError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SettlementError::InvalidArgument(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SettlementError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SettlementError::NotFound { .. })
    }
}

/// Result type for settlement operations
pub type SettlementResult<T> = Result<T, SettlementError>;
