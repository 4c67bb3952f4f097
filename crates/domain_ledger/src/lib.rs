//! Ledger Domain - Cash Wallets and the Append-Only Journal
//!
//! This crate owns every cash balance in the marketplace. Balances change
//! only through [`LedgerService::record_transaction`], which:
//!
//! - rejects a reused idempotency key before mutating anything
//! - serializes all mutations for a user behind an exclusive wallet lock
//! - refuses any change that would leave the balance negative
//! - appends one immutable [`CashTransaction`] with a `balance_after` snapshot
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_ledger::{LedgerService, InMemoryLedgerStore};
//!
//! let ledger = LedgerService::new(Arc::new(InMemoryLedgerStore::new()));
//! ledger.charge(user_id, 50_000, None).await?;
//! ledger.debit(user_id, 30_000, None).await?;
//! assert_eq!(ledger.balance(user_id).await?, 20_000);
//! ```

pub mod wallet;
pub mod transaction;
pub mod ledger;
pub mod ports;
pub mod memory;
pub mod error;

pub use wallet::{BalanceAudit, Wallet};
pub use transaction::{
    CashTransaction, CashTransactionType, TransactionQuery, TransactionReference, TransactionRequest,
};
pub use ledger::LedgerService;
pub use ports::{LedgerStore, WalletLock};
pub use memory::InMemoryLedgerStore;
pub use error::{LedgerError, LedgerResult};
