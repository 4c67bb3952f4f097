//! Ledger Service
//!
//! The only writer of wallet balances. Every accepted mutation appends one
//! immutable [`CashTransaction`] whose `balance_after` snapshot is taken under
//! the user's exclusive lock, so replaying a user's journal in creation order
//! always reconstructs the wallet balance.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use core_kernel::{Cash, UserId};

use crate::error::{LedgerError, LedgerResult};
use crate::ports::LedgerStore;
use crate::transaction::{
    CashTransaction, CashTransactionType, TransactionQuery, TransactionReference, TransactionRequest,
};
use crate::wallet::{BalanceAudit, Wallet};

/// Cash ledger service
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Records a cash transaction at most once per idempotency key
    ///
    /// The key is checked inside the user's locked section before anything
    /// is mutated. A request that would drive the balance negative is
    /// rejected and leaves no trace.
    ///
    /// # Errors
    ///
    /// - `DuplicateTransaction` if the key was already used
    /// - `InsufficientBalance` if the new balance would be negative
    /// - `InvalidArgument` for a zero amount, a sign that does not match the
    ///   type, or a blank key
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            transaction_type = %request.transaction_type,
            amount = request.amount,
        )
    )]
    pub async fn record_transaction(&self, request: TransactionRequest) -> LedgerResult<CashTransaction> {
        request.validate()?;

        let mut lock = self.store.lock_wallet(request.user_id).await?;
        debug!("Wallet lock acquired");

        if lock.idempotency_key_exists(&request.idempotency_key).await? {
            warn!(idempotency_key = %request.idempotency_key, "Duplicate idempotency key rejected");
            return Err(LedgerError::DuplicateTransaction(request.idempotency_key));
        }

        let mut wallet = lock.wallet().clone();
        let balance_after = match wallet.apply(request.amount) {
            Ok(balance) => balance,
            Err(err) => {
                warn!(balance = wallet.balance, "Transaction rejected: {}", err);
                return Err(err);
            }
        };

        let key = request.idempotency_key.clone();
        let transaction = CashTransaction::record(request, balance_after);

        match lock.commit(&wallet, &transaction).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                warn!(idempotency_key = %key, "Idempotency key taken by a concurrent writer");
                return Err(LedgerError::DuplicateTransaction(key));
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            transaction_id = %transaction.id,
            balance_after,
            "Cash transaction recorded"
        );
        Ok(transaction)
    }

    /// Credits a successful top-up
    pub async fn charge(
        &self,
        user_id: UserId,
        amount: Cash,
        reference: Option<TransactionReference>,
    ) -> LedgerResult<CashTransaction> {
        self.record_fresh(user_id, CashTransactionType::Charge, amount, reference)
            .await
    }

    /// Confirms a spend; `amount` is the positive value leaving the wallet
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Cash,
        reference: Option<TransactionReference>,
    ) -> LedgerResult<CashTransaction> {
        let amount = positive(amount)?;
        self.record_fresh(user_id, CashTransactionType::Confirm, -amount, reference)
            .await
    }

    /// Returns money to the wallet
    pub async fn refund(
        &self,
        user_id: UserId,
        amount: Cash,
        reference: Option<TransactionReference>,
    ) -> LedgerResult<CashTransaction> {
        self.record_fresh(user_id, CashTransactionType::Refund, amount, reference)
            .await
    }

    /// Provisionally deducts `amount` (positive) from the wallet
    pub async fn hold(
        &self,
        user_id: UserId,
        amount: Cash,
        reference: Option<TransactionReference>,
    ) -> LedgerResult<CashTransaction> {
        let amount = positive(amount)?;
        self.record_fresh(user_id, CashTransactionType::Hold, -amount, reference)
            .await
    }

    /// Operator correction with a caller-supplied key
    pub async fn adjust(
        &self,
        user_id: UserId,
        amount: Cash,
        reason: &str,
        idempotency_key: impl Into<String>,
    ) -> LedgerResult<CashTransaction> {
        let request = TransactionRequest::new(user_id, CashTransactionType::Adjust, amount, idempotency_key)
            .with_reference("adjustment", reason);
        self.record_transaction(request).await
    }

    /// Each wrapper call is its own economic event, so it gets its own key
    async fn record_fresh(
        &self,
        user_id: UserId,
        transaction_type: CashTransactionType,
        amount: Cash,
        reference: Option<TransactionReference>,
    ) -> LedgerResult<CashTransaction> {
        let key = format!("{}-{}", transaction_type.as_str().to_lowercase(), Uuid::now_v7());
        let request = TransactionRequest::new(user_id, transaction_type, amount, key)
            .with_optional_reference(reference);
        self.record_transaction(request).await
    }

    /// Creates the user's wallet if needed
    #[instrument(skip(self))]
    pub async fn open_wallet(&self, user_id: UserId) -> LedgerResult<Wallet> {
        Ok(self.store.open_wallet(user_id).await?)
    }

    /// Current balance; a user without a wallet has a zero balance
    pub async fn balance(&self, user_id: UserId) -> LedgerResult<Cash> {
        Ok(self
            .store
            .find_wallet(user_id)
            .await?
            .map_or(0, |wallet| wallet.balance))
    }

    pub async fn wallet(&self, user_id: UserId) -> LedgerResult<Option<Wallet>> {
        Ok(self.store.find_wallet(user_id).await?)
    }

    /// Transaction history in creation order
    pub async fn history(&self, query: &TransactionQuery) -> LedgerResult<Vec<CashTransaction>> {
        Ok(self.store.list_transactions(query).await?)
    }

    /// Looks up the transaction recorded under an idempotency key
    pub async fn transaction_for_key(&self, key: &str) -> LedgerResult<Option<CashTransaction>> {
        Ok(self.store.find_by_idempotency_key(key).await?)
    }

    /// Replays the user's journal and compares it with the wallet
    #[instrument(skip(self))]
    pub async fn audit_balance(&self, user_id: UserId) -> LedgerResult<BalanceAudit> {
        let wallet_balance = self.balance(user_id).await?;
        let transactions = self
            .store
            .list_transactions(&TransactionQuery::for_user(user_id))
            .await?;

        let mut replayed_balance: Cash = 0;
        let mut snapshot_mismatches = 0;
        for transaction in &transactions {
            replayed_balance = replayed_balance
                .checked_add(transaction.amount)
                .ok_or(LedgerError::BalanceOverflow(user_id))?;
            if transaction.balance_after != replayed_balance {
                snapshot_mismatches += 1;
            }
        }

        let audit = BalanceAudit {
            user_id,
            wallet_balance,
            replayed_balance,
            transaction_count: transactions.len(),
            snapshot_mismatches,
        };
        if !audit.is_consistent() {
            warn!(?audit, "Balance audit found an inconsistency");
        }
        Ok(audit)
    }
}

fn positive(amount: Cash) -> LedgerResult<Cash> {
    if amount <= 0 {
        return Err(LedgerError::invalid(format!("amount must be positive: {}", amount)));
    }
    Ok(amount)
}
