//! Cash transactions
//!
//! A cash transaction is an immutable audit row. Every change to a wallet
//! balance produces exactly one, and nothing ever edits or deletes one:
//! reversing an effect means recording a new transaction with the opposite
//! sign.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Cash, CashTransactionId, UserId};
use crate::error::LedgerError;

/// Kinds of cash movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashTransactionType {
    /// Top-up after a successful payment (positive)
    Charge,
    /// Confirmed spend, e.g. a credit purchase (negative)
    Confirm,
    /// Money returned to the wallet (positive)
    Refund,
    /// Provisional deduction (negative)
    Hold,
    /// Operator correction (either sign)
    Adjust,
}

impl CashTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashTransactionType::Charge => "CHARGE",
            CashTransactionType::Confirm => "CONFIRM",
            CashTransactionType::Refund => "REFUND",
            CashTransactionType::Hold => "HOLD",
            CashTransactionType::Adjust => "ADJUST",
        }
    }

    /// Checks that the amount's sign matches the transaction type
    pub fn validate_amount(&self, amount: Cash) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::invalid(format!("{} amount must not be zero", self)));
        }
        let sign_ok = match self {
            CashTransactionType::Charge | CashTransactionType::Refund => amount > 0,
            CashTransactionType::Confirm | CashTransactionType::Hold => amount < 0,
            CashTransactionType::Adjust => true,
        };
        if !sign_ok {
            return Err(LedgerError::invalid(format!(
                "{} amount has the wrong sign: {}",
                self, amount
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CashTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CashTransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHARGE" => Ok(CashTransactionType::Charge),
            "CONFIRM" => Ok(CashTransactionType::Confirm),
            "REFUND" => Ok(CashTransactionType::Refund),
            "HOLD" => Ok(CashTransactionType::Hold),
            "ADJUST" => Ok(CashTransactionType::Adjust),
            other => Err(LedgerError::invalid(format!("unknown transaction type: {}", other))),
        }
    }
}

/// Pointer to the entity that caused a transaction (booking, payment, product)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReference {
    pub ref_type: String,
    pub ref_id: String,
}

impl TransactionReference {
    pub fn new(ref_type: impl Into<String>, ref_id: impl fmt::Display) -> Self {
        Self {
            ref_type: ref_type.into(),
            ref_id: ref_id.to_string(),
        }
    }
}

/// An immutable, append-only cash ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashTransaction {
    pub id: CashTransactionId,
    pub user_id: UserId,
    pub transaction_type: CashTransactionType,
    /// Signed amount; negative for money leaving the wallet
    pub amount: Cash,
    /// Wallet balance right after this transaction was applied
    pub balance_after: Cash,
    pub reference: Option<TransactionReference>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl CashTransaction {
    /// Builds the audit row for an accepted request
    pub fn record(request: TransactionRequest, balance_after: Cash) -> Self {
        Self {
            id: CashTransactionId::new_v7(),
            user_id: request.user_id,
            transaction_type: request.transaction_type,
            amount: request.amount,
            balance_after,
            reference: request.reference,
            idempotency_key: request.idempotency_key,
            created_at: Utc::now(),
        }
    }
}

/// Request to record a cash transaction
///
/// # Example
///
/// ```rust
/// use core_kernel::UserId;
/// use domain_ledger::{CashTransactionType, TransactionRequest};
///
/// let request = TransactionRequest::new(
///     UserId::new(),
///     CashTransactionType::Charge,
///     50_000,
///     "payment-7f3a",
/// )
/// .with_reference("payment", "pg-7f3a");
///
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub user_id: UserId,
    pub transaction_type: CashTransactionType,
    pub amount: Cash,
    pub reference: Option<TransactionReference>,
    pub idempotency_key: String,
}

impl TransactionRequest {
    pub fn new(
        user_id: UserId,
        transaction_type: CashTransactionType,
        amount: Cash,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            transaction_type,
            amount,
            reference: None,
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn with_reference(mut self, ref_type: impl Into<String>, ref_id: impl fmt::Display) -> Self {
        self.reference = Some(TransactionReference::new(ref_type, ref_id));
        self
    }

    pub fn with_optional_reference(mut self, reference: Option<TransactionReference>) -> Self {
        self.reference = reference;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.idempotency_key.trim().is_empty() {
            return Err(LedgerError::invalid("idempotency key must not be empty"));
        }
        self.transaction_type.validate_amount(self.amount)
    }
}

/// Filter for transaction history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub user_id: UserId,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
    /// Empty means every type
    pub types: Vec<CashTransactionType>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

impl TransactionQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            from: None,
            to: None,
            types: Vec::new(),
            limit: None,
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn of_type(mut self, transaction_type: CashTransactionType) -> Self {
        self.types.push(transaction_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the transaction passes every filter except `limit`
    pub fn matches(&self, transaction: &CashTransaction) -> bool {
        transaction.user_id == self.user_id
            && self.from.map_or(true, |from| transaction.created_at >= from)
            && self.to.map_or(true, |to| transaction.created_at < to)
            && (self.types.is_empty() || self.types.contains(&transaction.transaction_type))
    }
}
