//! Ledger domain errors

use core_kernel::{Cash, PortError, UserId};
use thiserror::Error;

/// Errors that can occur in the cash ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Idempotency key already used; the earlier application stands
    #[error("Duplicate transaction: idempotency key '{0}' already used")]
    DuplicateTransaction(String),

    /// The mutation would drive the wallet below zero
    #[error("Insufficient balance for {user_id}: available {available}, required {required}")]
    InsufficientBalance {
        user_id: UserId,
        available: Cash,
        required: Cash,
    },

    /// Malformed request (zero amount, wrong sign for the type, empty key)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Balance arithmetic overflowed
    #[error("Balance overflow for {0}")]
    BalanceOverflow(UserId),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] PortError),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    /// Returns true if the caller can treat the operation as already applied
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateTransaction(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
