//! PostgreSQL settlement adapter
//!
//! A settlement scope is a single database transaction. Opening it takes
//! three advisory locks in the documented order: the session, the customer's
//! credit owner lock (through [`PgCreditLock`]) and the counselor's month.
//! The unique index on `settlement_transactions.session_id` is the last line
//! of defence against a double settlement.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    BookingId, CommissionRate, CounselorId, CounselorSettlementId, DomainPort, HealthCheckResult,
    HealthCheckable, PortError, SessionId, SettlementPeriod, SettlementTransactionId, UserId,
};
use domain_credit::CreditLock;
use domain_settlement::{
    CounselorSettlement, SettlementKey, SettlementScope, SettlementStatus, SettlementStore,
    SettlementTransaction,
};

use super::{advisory_lock, owner_key, probe, units_from_db, units_to_db, LockClass, PgCreditLock};
use crate::error::port_error;

const TRANSACTION_COLUMNS: &str = "settlement_id, session_id, booking_id, customer_id, counselor_id, \
     credits_reserved, credits_consumed, credits_refunded, actual_duration_sec, settlement_type, \
     counselor_earning, platform_fee, commission_rate, period_start, settled_at";

const MONTH_COLUMNS: &str = "settlement_id, counselor_id, period_start, period_end, total_sessions, \
     total_duration_min, gross_amount, commission_amount, net_amount, status, commission_rate, \
     confirmed_at, paid_at, created_at, updated_at";

fn commission_rate_from_db(rate: Decimal) -> Result<CommissionRate, PortError> {
    CommissionRate::new(rate).map_err(|e| PortError::corrupt(format!("commission rate {}: {}", rate, e)))
}

fn month_key(counselor_id: CounselorId, period_start: NaiveDate) -> String {
    format!("{}:{}", owner_key(Uuid::from(counselor_id)), period_start)
}

#[derive(Debug, FromRow)]
struct SettlementTransactionRow {
    settlement_id: Uuid,
    session_id: Uuid,
    booking_id: Uuid,
    customer_id: Uuid,
    counselor_id: Uuid,
    credits_reserved: i32,
    credits_consumed: i32,
    credits_refunded: i32,
    actual_duration_sec: i64,
    settlement_type: String,
    counselor_earning: i64,
    platform_fee: i64,
    commission_rate: Decimal,
    period_start: NaiveDate,
    settled_at: DateTime<Utc>,
}

impl TryFrom<SettlementTransactionRow> for SettlementTransaction {
    type Error = PortError;

    fn try_from(row: SettlementTransactionRow) -> Result<Self, Self::Error> {
        let settlement_type = row
            .settlement_type
            .parse()
            .map_err(|e| PortError::corrupt(format!("settlement {}: {}", row.settlement_id, e)))?;
        let actual_duration_sec = u64::try_from(row.actual_duration_sec).map_err(|_| {
            PortError::corrupt(format!(
                "settlement {} has negative duration {}",
                row.settlement_id, row.actual_duration_sec
            ))
        })?;

        Ok(SettlementTransaction {
            id: SettlementTransactionId::from_uuid(row.settlement_id),
            session_id: SessionId::from_uuid(row.session_id),
            booking_id: BookingId::from_uuid(row.booking_id),
            customer_id: UserId::from_uuid(row.customer_id),
            counselor_id: CounselorId::from_uuid(row.counselor_id),
            credits_reserved: units_from_db(row.credits_reserved, "credits_reserved")?,
            credits_consumed: units_from_db(row.credits_consumed, "credits_consumed")?,
            credits_refunded: units_from_db(row.credits_refunded, "credits_refunded")?,
            actual_duration_sec,
            settlement_type,
            counselor_earning: row.counselor_earning,
            platform_fee: row.platform_fee,
            commission_rate: commission_rate_from_db(row.commission_rate)?,
            period_start: row.period_start,
            settled_at: row.settled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CounselorSettlementRow {
    settlement_id: Uuid,
    counselor_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
    total_sessions: i32,
    total_duration_min: i64,
    gross_amount: i64,
    commission_amount: i64,
    net_amount: i64,
    status: String,
    commission_rate: Decimal,
    confirmed_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CounselorSettlementRow> for CounselorSettlement {
    type Error = PortError;

    fn try_from(row: CounselorSettlementRow) -> Result<Self, Self::Error> {
        let period = SettlementPeriod::from_bounds(row.period_start, row.period_end)
            .map_err(|e| PortError::corrupt(format!("counselor settlement {}: {}", row.settlement_id, e)))?;
        let status = row
            .status
            .parse()
            .map_err(|e| PortError::corrupt(format!("counselor settlement {}: {}", row.settlement_id, e)))?;
        let total_duration_min = u64::try_from(row.total_duration_min).map_err(|_| {
            PortError::corrupt(format!(
                "counselor settlement {} has negative duration {}",
                row.settlement_id, row.total_duration_min
            ))
        })?;

        Ok(CounselorSettlement {
            id: CounselorSettlementId::from_uuid(row.settlement_id),
            counselor_id: CounselorId::from_uuid(row.counselor_id),
            period,
            total_sessions: units_from_db(row.total_sessions, "total_sessions")?,
            total_duration_min,
            gross_amount: row.gross_amount,
            commission_amount: row.commission_amount,
            net_amount: row.net_amount,
            status,
            commission_rate: commission_rate_from_db(row.commission_rate)?,
            confirmed_at: row.confirmed_at,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn months_from_rows(rows: Vec<CounselorSettlementRow>) -> Result<Vec<CounselorSettlement>, PortError> {
    rows.into_iter().map(CounselorSettlement::try_from).collect()
}

/// Settlement store backed by `settlement_transactions` and
/// `counselor_settlement`
#[derive(Debug, Clone)]
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgSettlementStore {}

#[async_trait]
impl HealthCheckable for PgSettlementStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-settlement").await
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    #[instrument(skip(self, key), fields(session_id = %key.session_id))]
    async fn begin(&self, key: SettlementKey) -> Result<Box<dyn SettlementScope>, PortError> {
        let mut tx = self.pool.begin().await.map_err(port_error)?;
        advisory_lock(&mut tx, LockClass::Session, &owner_key(Uuid::from(key.session_id))).await?;

        let mut credits = PgCreditLock::acquire(tx, key.customer_id).await?;
        advisory_lock(
            &mut credits.tx,
            LockClass::CounselorMonth,
            &month_key(key.counselor_id, key.period.start()),
        )
        .await?;

        debug!("Settlement scope opened");
        Ok(Box::new(PgSettlementScope { key, credits }))
    }

    async fn find_by_session(&self, session_id: SessionId) -> Result<Option<SettlementTransaction>, PortError> {
        let row: Option<SettlementTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM settlement_transactions WHERE session_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::from(session_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        row.map(SettlementTransaction::try_from).transpose()
    }

    async fn counselor_settlement(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> Result<Option<CounselorSettlement>, PortError> {
        let row: Option<CounselorSettlementRow> = sqlx::query_as(&format!(
            "SELECT {} FROM counselor_settlement WHERE counselor_id = $1 AND period_start = $2",
            MONTH_COLUMNS
        ))
        .bind(Uuid::from(counselor_id))
        .bind(period.start())
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        row.map(CounselorSettlement::try_from).transpose()
    }

    async fn counselor_settlements(&self, counselor_id: CounselorId) -> Result<Vec<CounselorSettlement>, PortError> {
        let rows: Vec<CounselorSettlementRow> = sqlx::query_as(&format!(
            "SELECT {} FROM counselor_settlement WHERE counselor_id = $1 ORDER BY period_start",
            MONTH_COLUMNS
        ))
        .bind(Uuid::from(counselor_id))
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        months_from_rows(rows)
    }

    async fn session_settlements(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> Result<Vec<SettlementTransaction>, PortError> {
        let rows: Vec<SettlementTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM settlement_transactions \
             WHERE counselor_id = $1 AND period_start = $2 ORDER BY seq",
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::from(counselor_id))
        .bind(period.start())
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        rows.into_iter().map(SettlementTransaction::try_from).collect()
    }

    async fn update_status(
        &self,
        settlement: &CounselorSettlement,
        expected: SettlementStatus,
    ) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE counselor_settlement \
             SET status = $3, confirmed_at = $4, paid_at = $5, updated_at = $6 \
             WHERE counselor_id = $1 AND period_start = $2 AND status = $7",
        )
        .bind(Uuid::from(settlement.counselor_id))
        .bind(settlement.period.start())
        .bind(settlement.status.as_str())
        .bind(settlement.confirmed_at)
        .bind(settlement.paid_at)
        .bind(settlement.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.counselor_settlement(settlement.counselor_id, settlement.period).await? {
            Some(current) => Err(PortError::conflict(format!(
                "settlement {} is {}, expected {}",
                current.id, current.status, expected
            ))),
            None => Err(PortError::not_found("CounselorSettlement", settlement.id)),
        }
    }
}

/// One session's settlement transaction
pub struct PgSettlementScope {
    key: SettlementKey,
    credits: PgCreditLock,
}

#[async_trait]
impl SettlementScope for PgSettlementScope {
    async fn existing(&mut self) -> Result<Option<SettlementTransaction>, PortError> {
        let row: Option<SettlementTransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM settlement_transactions WHERE session_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::from(self.key.session_id))
        .fetch_optional(&mut *self.credits.tx)
        .await
        .map_err(port_error)?;

        row.map(SettlementTransaction::try_from).transpose()
    }

    fn credits(&mut self) -> &mut dyn CreditLock {
        &mut self.credits
    }

    async fn counselor_settlement(&mut self) -> Result<Option<CounselorSettlement>, PortError> {
        let row: Option<CounselorSettlementRow> = sqlx::query_as(&format!(
            "SELECT {} FROM counselor_settlement \
             WHERE counselor_id = $1 AND period_start = $2 FOR UPDATE",
            MONTH_COLUMNS
        ))
        .bind(Uuid::from(self.key.counselor_id))
        .bind(self.key.period.start())
        .fetch_optional(&mut *self.credits.tx)
        .await
        .map_err(port_error)?;

        row.map(CounselorSettlement::try_from).transpose()
    }

    async fn save_counselor_settlement(&mut self, settlement: &CounselorSettlement) -> Result<(), PortError> {
        if settlement.counselor_id != self.key.counselor_id || settlement.period != self.key.period {
            return Err(PortError::internal("settlement month outside the scope's lock"));
        }

        sqlx::query(&format!(
            "INSERT INTO counselor_settlement ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (counselor_id, period_start) DO UPDATE SET \
                 total_sessions = EXCLUDED.total_sessions, \
                 total_duration_min = EXCLUDED.total_duration_min, \
                 gross_amount = EXCLUDED.gross_amount, \
                 commission_amount = EXCLUDED.commission_amount, \
                 net_amount = EXCLUDED.net_amount, \
                 updated_at = EXCLUDED.updated_at",
            MONTH_COLUMNS
        ))
        .bind(Uuid::from(settlement.id))
        .bind(Uuid::from(settlement.counselor_id))
        .bind(settlement.period.start())
        .bind(settlement.period.end())
        .bind(units_to_db(settlement.total_sessions)?)
        .bind(i64::try_from(settlement.total_duration_min).map_err(|_| {
            PortError::internal(format!("duration out of range: {}", settlement.total_duration_min))
        })?)
        .bind(settlement.gross_amount)
        .bind(settlement.commission_amount)
        .bind(settlement.net_amount)
        .bind(settlement.status.as_str())
        .bind(settlement.commission_rate.fraction())
        .bind(settlement.confirmed_at)
        .bind(settlement.paid_at)
        .bind(settlement.created_at)
        .bind(settlement.updated_at)
        .execute(&mut *self.credits.tx)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &SettlementTransaction) -> Result<(), PortError> {
        if transaction.session_id != self.key.session_id {
            return Err(PortError::internal("settlement session outside the scope's lock"));
        }

        sqlx::query(&format!(
            "INSERT INTO settlement_transactions ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::from(transaction.id))
        .bind(Uuid::from(transaction.session_id))
        .bind(Uuid::from(transaction.booking_id))
        .bind(Uuid::from(transaction.customer_id))
        .bind(Uuid::from(transaction.counselor_id))
        .bind(units_to_db(transaction.credits_reserved)?)
        .bind(units_to_db(transaction.credits_consumed)?)
        .bind(units_to_db(transaction.credits_refunded)?)
        .bind(i64::try_from(transaction.actual_duration_sec).map_err(|_| {
            PortError::internal(format!("duration out of range: {}", transaction.actual_duration_sec))
        })?)
        .bind(transaction.settlement_type.as_str())
        .bind(transaction.counselor_earning)
        .bind(transaction.platform_fee)
        .bind(transaction.commission_rate.fraction())
        .bind(transaction.period_start)
        .bind(transaction.settled_at)
        .execute(&mut *self.credits.tx)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let scope = *self;
        scope.credits.tx.commit().await.map_err(port_error)
    }
}
