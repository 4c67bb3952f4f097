//! Wallet entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Cash, UserId};
use crate::error::LedgerError;

/// One cash wallet per user
///
/// # Invariants
///
/// - `balance` is never negative
/// - `balance` equals the sum of the user's cash transaction amounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Cash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an empty wallet
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a signed amount and returns the new balance
    ///
    /// # Errors
    ///
    /// - `InsufficientBalance` if the result would be negative; the wallet is
    ///   left untouched
    /// - `BalanceOverflow` if the addition overflows
    pub fn apply(&mut self, amount: Cash) -> Result<Cash, LedgerError> {
        let new_balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(self.user_id))?;

        if new_balance < 0 {
            return Err(LedgerError::InsufficientBalance {
                user_id: self.user_id,
                available: self.balance,
                required: -amount,
            });
        }

        self.balance = new_balance;
        self.updated_at = Utc::now();
        Ok(new_balance)
    }
}

/// Result of replaying a user's transactions against the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub user_id: UserId,
    pub wallet_balance: Cash,
    pub replayed_balance: Cash,
    pub transaction_count: usize,
    /// Transactions whose `balance_after` disagrees with the running sum
    pub snapshot_mismatches: usize,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.wallet_balance == self.replayed_balance && self.snapshot_mismatches == 0
    }
}
