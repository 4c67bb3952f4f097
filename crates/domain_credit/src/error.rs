//! Credit domain errors

use core_kernel::{BookingId, CreditLotId, PortError};
use domain_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur in the credit inventory
#[derive(Debug, Error)]
pub enum CreditError {
    /// The user's lots cannot cover the request; nothing was reserved
    #[error("Insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: u32, available: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The booking already holds a reservation
    #[error("Booking {0} already has reserved credits")]
    AlreadyReserved(BookingId),

    /// The booking's usage logs were already reconciled by settlement
    #[error("Booking {0} is already settled")]
    AlreadySettled(BookingId),

    /// A usage log points at a lot that does not exist for its owner
    #[error("Credit lot not found: {0}")]
    LotNotFound(CreditLotId),

    /// A lot mutation would break `0 <= remaining <= total`
    #[error("Credit lot {lot_id}: {message}")]
    LotInvariant { lot_id: CreditLotId, message: String },

    /// A purchase debited cash, could not create its lot, and the reversing
    /// refund failed too; the user is out `amount` until reconciled
    #[error("Purchase {idempotency_key} left {amount} debited without a lot: {original}; reversal failed: {compensation}")]
    CompensationFailed {
        idempotency_key: String,
        amount: core_kernel::Cash,
        original: Box<CreditError>,
        compensation: LedgerError,
    },

    /// Cash side of a credit purchase failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] PortError),
}

impl CreditError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CreditError::InvalidArgument(message.into())
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, CreditError::InsufficientCredits { .. })
    }
}

/// Result type for credit operations
pub type CreditResult<T> = Result<T, CreditError>;
