//! Ledger Domain Ports
//!
//! The `LedgerStore` port is what the Ledger Service needs from persistence.
//! Balance mutation goes through a [`WalletLock`]: acquiring one takes the
//! user's exclusive wallet lock (a row lock in PostgreSQL, a per-user mutex
//! in process), and nothing is visible to other callers until `commit`.
//!
//! ```rust,ignore
//! let mut lock = store.lock_wallet(user_id).await?;
//! if lock.idempotency_key_exists(&key).await? {
//!     return Err(LedgerError::DuplicateTransaction(key));
//! }
//! let mut wallet = lock.wallet().clone();
//! let balance_after = wallet.apply(amount)?; // early return drops the lock: rollback
//! lock.commit(&wallet, &CashTransaction::record(request, balance_after)).await?;
//! ```

use async_trait::async_trait;

use core_kernel::{DomainPort, HealthCheckable, PortError, UserId};

use crate::transaction::{CashTransaction, TransactionQuery};
use crate::wallet::Wallet;

/// Persistence port for wallets and the cash journal
#[async_trait]
pub trait LedgerStore: DomainPort + HealthCheckable {
    /// Takes the user's exclusive wallet lock
    ///
    /// The wallet is created lazily: if the user has none, the lock exposes
    /// an empty wallet which is persisted on commit.
    async fn lock_wallet(&self, user_id: UserId) -> Result<Box<dyn WalletLock>, PortError>;

    /// Creates the user's wallet if it does not exist and returns it
    async fn open_wallet(&self, user_id: UserId) -> Result<Wallet, PortError>;

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, PortError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<CashTransaction>, PortError>;

    /// Returns matching transactions in creation order
    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<CashTransaction>, PortError>;
}

/// Exclusive hold on one user's wallet
#[async_trait]
pub trait WalletLock: Send {
    /// The wallet as of lock acquisition
    fn wallet(&self) -> &Wallet;

    /// Checks the global idempotency key index inside the locked section
    async fn idempotency_key_exists(&mut self, key: &str) -> Result<bool, PortError>;

    /// Persists the new wallet state and appends the transaction atomically
    ///
    /// Returns `PortError::Conflict` if the idempotency key was taken by a
    /// concurrent writer; in that case nothing is written.
    async fn commit(self: Box<Self>, wallet: &Wallet, transaction: &CashTransaction) -> Result<(), PortError>;
}
