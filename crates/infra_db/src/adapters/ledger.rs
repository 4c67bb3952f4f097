//! PostgreSQL ledger adapter
//!
//! The wallet row is the user's lock: `lock_wallet` opens a transaction,
//! creates the row if missing and takes it `FOR UPDATE`. The unique index on
//! `cash_transactions.idempotency_key` backs the global idempotency check, so
//! a key that slips past the in-lock lookup still fails on insert and is
//! reported as a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{CashTransactionId, DomainPort, HealthCheckResult, HealthCheckable, PortError, UserId};
use domain_ledger::{
    CashTransaction, LedgerStore, TransactionQuery, TransactionReference, Wallet, WalletLock,
};

use super::probe;
use crate::error::port_error;

const TRANSACTION_COLUMNS: &str = "transaction_id, user_id, transaction_type, amount, balance_after, \
     ref_type, ref_id, idempotency_key, created_at";

#[derive(Debug, FromRow)]
struct WalletRow {
    user_id: Uuid,
    balance_cash: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            user_id: UserId::from_uuid(row.user_id),
            balance: row.balance_cash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CashTransactionRow {
    transaction_id: Uuid,
    user_id: Uuid,
    transaction_type: String,
    amount: i64,
    balance_after: i64,
    ref_type: Option<String>,
    ref_id: Option<String>,
    idempotency_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CashTransactionRow> for CashTransaction {
    type Error = PortError;

    fn try_from(row: CashTransactionRow) -> Result<Self, Self::Error> {
        let transaction_type = row
            .transaction_type
            .parse()
            .map_err(|e| PortError::corrupt(format!("cash transaction {}: {}", row.transaction_id, e)))?;
        let reference = match (row.ref_type, row.ref_id) {
            (Some(ref_type), Some(ref_id)) => Some(TransactionReference { ref_type, ref_id }),
            _ => None,
        };

        Ok(CashTransaction {
            id: CashTransactionId::from_uuid(row.transaction_id),
            user_id: UserId::from_uuid(row.user_id),
            transaction_type,
            amount: row.amount,
            balance_after: row.balance_after,
            reference,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

/// Ledger store backed by the `wallets` and `cash_transactions` tables
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgLedgerStore {}

#[async_trait]
impl HealthCheckable for PgLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-ledger").await
    }
}

async fn ensure_wallet<'e, E>(executor: E, user_id: UserId) -> Result<(), PortError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO wallets (user_id, balance_cash, created_at, updated_at) \
         VALUES ($1, 0, $2, $2) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(Uuid::from(user_id))
    .bind(now)
    .execute(executor)
    .await
    .map_err(port_error)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self))]
    async fn lock_wallet(&self, user_id: UserId) -> Result<Box<dyn WalletLock>, PortError> {
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        // Rolled back with everything else if the lock is dropped
        ensure_wallet(&mut *tx, user_id).await?;

        let row: WalletRow = sqlx::query_as(
            "SELECT user_id, balance_cash, created_at, updated_at \
             FROM wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(Uuid::from(user_id))
        .fetch_one(&mut *tx)
        .await
        .map_err(port_error)?;

        debug!("Wallet row locked");
        Ok(Box::new(PgWalletLock {
            tx,
            wallet: row.into(),
        }))
    }

    async fn open_wallet(&self, user_id: UserId) -> Result<Wallet, PortError> {
        ensure_wallet(&self.pool, user_id).await?;
        self.find_wallet(user_id)
            .await?
            .ok_or_else(|| PortError::not_found("Wallet", user_id))
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, PortError> {
        let row: Option<WalletRow> = sqlx::query_as(
            "SELECT user_id, balance_cash, created_at, updated_at FROM wallets WHERE user_id = $1",
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(row.map(Wallet::from))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<CashTransaction>, PortError> {
        let row: Option<CashTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cash_transactions WHERE idempotency_key = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        row.map(CashTransaction::try_from).transpose()
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<CashTransaction>, PortError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(TRANSACTION_COLUMNS);
        builder.push(" FROM cash_transactions WHERE user_id = ");
        builder.push_bind(Uuid::from(query.user_id));

        if let Some(from) = query.from {
            builder.push(" AND created_at >= ");
            builder.push_bind(from);
        }
        if let Some(to) = query.to {
            builder.push(" AND created_at < ");
            builder.push_bind(to);
        }
        if !query.types.is_empty() {
            let types: Vec<String> = query.types.iter().map(|t| t.as_str().to_string()).collect();
            builder.push(" AND transaction_type = ANY(");
            builder.push_bind(types);
            builder.push(")");
        }

        // The most recent N are selected newest first and flipped back
        match query.limit {
            Some(limit) => {
                builder.push(" ORDER BY seq DESC LIMIT ");
                builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
            }
            None => {
                builder.push(" ORDER BY seq ASC");
            }
        }

        let rows: Vec<CashTransactionRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;

        let mut transactions = rows
            .into_iter()
            .map(CashTransaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if query.limit.is_some() {
            transactions.reverse();
        }
        Ok(transactions)
    }
}

/// Row lock on one wallet inside an open transaction
pub struct PgWalletLock {
    tx: Transaction<'static, Postgres>,
    wallet: Wallet,
}

#[async_trait]
impl WalletLock for PgWalletLock {
    fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    async fn idempotency_key_exists(&mut self, key: &str) -> Result<bool, PortError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM cash_transactions WHERE idempotency_key = $1)",
        )
        .bind(key)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(port_error)
    }

    async fn commit(self: Box<Self>, wallet: &Wallet, transaction: &CashTransaction) -> Result<(), PortError> {
        let PgWalletLock { mut tx, wallet: locked } = *self;
        if wallet.user_id != locked.user_id || transaction.user_id != locked.user_id {
            return Err(PortError::internal("wallet commit for a user other than the lock owner"));
        }

        sqlx::query("UPDATE wallets SET balance_cash = $2, updated_at = $3 WHERE user_id = $1")
            .bind(Uuid::from(wallet.user_id))
            .bind(wallet.balance)
            .bind(wallet.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(port_error)?;

        let (ref_type, ref_id) = match &transaction.reference {
            Some(reference) => (Some(reference.ref_type.as_str()), Some(reference.ref_id.as_str())),
            None => (None, None),
        };

        sqlx::query(&format!(
            "INSERT INTO cash_transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::from(transaction.id))
        .bind(Uuid::from(transaction.user_id))
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount)
        .bind(transaction.balance_after)
        .bind(ref_type)
        .bind(ref_id)
        .bind(transaction.idempotency_key.as_str())
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await
        .map_err(port_error)?;

        tx.commit().await.map_err(port_error)
    }
}
