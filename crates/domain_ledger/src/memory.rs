//! In-process ledger adapter
//!
//! Serializes balance mutation with one async mutex per user. A
//! [`MemoryWalletLock`] owns that mutex guard for its lifetime and works on a
//! copy of the wallet, so an uncommitted lock leaves no trace when dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError, UserId};

use crate::ports::{LedgerStore, WalletLock};
use crate::transaction::{CashTransaction, TransactionQuery};
use crate::wallet::Wallet;

type WalletSlot = Arc<Mutex<Option<Wallet>>>;

#[derive(Default)]
struct Journal {
    entries: Vec<CashTransaction>,
    by_key: HashMap<String, usize>,
}

#[derive(Default)]
struct LedgerTables {
    wallets: Mutex<HashMap<UserId, WalletSlot>>,
    journal: Mutex<Journal>,
}

/// Ledger store kept in process memory
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<LedgerTables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, user_id: UserId) -> WalletSlot {
        let mut wallets = self.tables.wallets.lock().await;
        wallets.entry(user_id).or_default().clone()
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-ledger")
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn lock_wallet(&self, user_id: UserId) -> Result<Box<dyn WalletLock>, PortError> {
        let guard = self.slot(user_id).await.lock_owned().await;
        debug!(%user_id, "In-memory wallet lock acquired");

        let wallet = guard.clone().unwrap_or_else(|| Wallet::new(user_id));
        Ok(Box::new(MemoryWalletLock {
            guard,
            wallet,
            tables: Arc::clone(&self.tables),
        }))
    }

    async fn open_wallet(&self, user_id: UserId) -> Result<Wallet, PortError> {
        let slot = self.slot(user_id).await;
        let mut guard = slot.lock().await;
        Ok(guard.get_or_insert_with(|| Wallet::new(user_id)).clone())
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, PortError> {
        let slot = {
            let wallets = self.tables.wallets.lock().await;
            wallets.get(&user_id).cloned()
        };
        match slot {
            Some(slot) => Ok(slot.lock().await.clone()),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<CashTransaction>, PortError> {
        let journal = self.tables.journal.lock().await;
        Ok(journal
            .by_key
            .get(key)
            .and_then(|index| journal.entries.get(*index))
            .cloned())
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<CashTransaction>, PortError> {
        let journal = self.tables.journal.lock().await;
        let mut matches: Vec<CashTransaction> = journal
            .entries
            .iter()
            .filter(|transaction| query.matches(transaction))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            let skip = matches.len().saturating_sub(limit);
            matches.drain(..skip);
        }
        Ok(matches)
    }
}

/// Exclusive hold on one in-memory wallet
pub struct MemoryWalletLock {
    guard: OwnedMutexGuard<Option<Wallet>>,
    wallet: Wallet,
    tables: Arc<LedgerTables>,
}

#[async_trait]
impl WalletLock for MemoryWalletLock {
    fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    async fn idempotency_key_exists(&mut self, key: &str) -> Result<bool, PortError> {
        Ok(self.tables.journal.lock().await.by_key.contains_key(key))
    }

    async fn commit(self: Box<Self>, wallet: &Wallet, transaction: &CashTransaction) -> Result<(), PortError> {
        let mut this = *self;
        {
            let mut journal = this.tables.journal.lock().await;
            if journal.by_key.contains_key(&transaction.idempotency_key) {
                return Err(PortError::conflict(format!(
                    "idempotency key '{}' already recorded",
                    transaction.idempotency_key
                )));
            }
            let index = journal.entries.len();
            journal.by_key.insert(transaction.idempotency_key.clone(), index);
            journal.entries.push(transaction.clone());
        }
        *this.guard = Some(wallet.clone());
        Ok(())
    }
}
