//! PostgreSQL credit inventory adapter
//!
//! A [`PgCreditLock`] is an open transaction holding the owner's credit
//! advisory lock. Lots it reads are also taken `FOR UPDATE`. Writes go
//! straight to the transaction and become visible on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    BookingId, CreditLotId, DomainPort, HealthCheckResult, HealthCheckable, PortError, UsageLogId,
    UserId,
};
use domain_credit::{CreditLock, CreditLot, CreditStore, CreditUsageLog};

use super::{advisory_lock, owner_key, probe, units_from_db, units_to_db, LockClass};
use crate::error::port_error;

const LOT_COLUMNS: &str =
    "lot_id, user_id, product_id, total_units, remaining_units, purchased_at, created_at";

const FIFO_ORDER: &str = "ORDER BY purchased_at, created_at, lot_id";

const USAGE_COLUMNS: &str = "usage_id, credit_id, booking_id, units_used, status, refunded_units, \
     used_at, consumed_at, actual_minutes";

#[derive(Debug, FromRow)]
struct CreditLotRow {
    lot_id: Uuid,
    user_id: Uuid,
    product_id: String,
    total_units: i32,
    remaining_units: i32,
    purchased_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CreditLotRow> for CreditLot {
    type Error = PortError;

    fn try_from(row: CreditLotRow) -> Result<Self, Self::Error> {
        let total_units = units_from_db(row.total_units, "total_units")?;
        let remaining_units = units_from_db(row.remaining_units, "remaining_units")?;
        if remaining_units > total_units {
            return Err(PortError::corrupt(format!(
                "lot {} has {} of {} units remaining",
                row.lot_id, remaining_units, total_units
            )));
        }

        Ok(CreditLot {
            id: CreditLotId::from_uuid(row.lot_id),
            user_id: UserId::from_uuid(row.user_id),
            product_id: row.product_id,
            total_units,
            remaining_units,
            purchased_at: row.purchased_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UsageLogRow {
    usage_id: Uuid,
    credit_id: Uuid,
    booking_id: Uuid,
    units_used: i32,
    status: String,
    refunded_units: i32,
    used_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
    actual_minutes: Option<i32>,
}

impl TryFrom<UsageLogRow> for CreditUsageLog {
    type Error = PortError;

    fn try_from(row: UsageLogRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| PortError::corrupt(format!("usage log {}: {}", row.usage_id, e)))?;
        let actual_minutes = row
            .actual_minutes
            .map(|minutes| units_from_db(minutes, "actual_minutes"))
            .transpose()?;

        Ok(CreditUsageLog {
            id: UsageLogId::from_uuid(row.usage_id),
            credit_id: CreditLotId::from_uuid(row.credit_id),
            booking_id: BookingId::from_uuid(row.booking_id),
            units_used: units_from_db(row.units_used, "units_used")?,
            status,
            refunded_units: units_from_db(row.refunded_units, "refunded_units")?,
            used_at: row.used_at,
            consumed_at: row.consumed_at,
            actual_minutes,
        })
    }
}

fn lots_from_rows(rows: Vec<CreditLotRow>) -> Result<Vec<CreditLot>, PortError> {
    rows.into_iter().map(CreditLot::try_from).collect()
}

fn usage_from_rows(rows: Vec<UsageLogRow>) -> Result<Vec<CreditUsageLog>, PortError> {
    rows.into_iter().map(CreditUsageLog::try_from).collect()
}

/// Credit store backed by the `credit_lots` and `credit_usage_log` tables
#[derive(Debug, Clone)]
pub struct PgCreditStore {
    pool: PgPool,
}

impl PgCreditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgCreditStore {}

#[async_trait]
impl HealthCheckable for PgCreditStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-credit").await
    }
}

#[async_trait]
impl CreditStore for PgCreditStore {
    #[instrument(skip(self))]
    async fn lock_owner(&self, user_id: UserId) -> Result<Box<dyn CreditLock>, PortError> {
        let tx = self.pool.begin().await.map_err(port_error)?;
        let lock = PgCreditLock::acquire(tx, user_id).await?;
        Ok(Box::new(lock))
    }

    async fn booking_owner(&self, booking_id: BookingId) -> Result<Option<UserId>, PortError> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT l.user_id FROM credit_usage_log u \
             JOIN credit_lots l ON l.lot_id = u.credit_id \
             WHERE u.booking_id = $1 \
             ORDER BY u.seq LIMIT 1",
        )
        .bind(Uuid::from(booking_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        Ok(owner.map(UserId::from_uuid))
    }

    async fn lots_for_user(&self, user_id: UserId) -> Result<Vec<CreditLot>, PortError> {
        let rows: Vec<CreditLotRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credit_lots WHERE user_id = $1 {}",
            LOT_COLUMNS, FIFO_ORDER
        ))
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        lots_from_rows(rows)
    }

    async fn usage_for_booking(&self, booking_id: BookingId) -> Result<Vec<CreditUsageLog>, PortError> {
        let rows: Vec<UsageLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credit_usage_log WHERE booking_id = $1 ORDER BY seq",
            USAGE_COLUMNS
        ))
        .bind(Uuid::from(booking_id))
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        usage_from_rows(rows)
    }
}

/// One owner's credit lock inside an open transaction
///
/// Settlement scopes embed this lock and commit its transaction themselves.
pub struct PgCreditLock {
    pub(crate) tx: Transaction<'static, Postgres>,
    user_id: UserId,
}

impl PgCreditLock {
    /// Takes the owner's credit lock on an already open transaction
    pub(crate) async fn acquire(
        mut tx: Transaction<'static, Postgres>,
        user_id: UserId,
    ) -> Result<Self, PortError> {
        advisory_lock(&mut tx, LockClass::CreditOwner, &owner_key(Uuid::from(user_id))).await?;
        debug!(user_id = %user_id, "Credit owner lock taken");
        Ok(Self { tx, user_id })
    }

    fn check_owner(&self, owner: UserId, what: &str) -> Result<(), PortError> {
        if owner != self.user_id {
            return Err(PortError::internal(format!(
                "{} belongs to {}, lock is held for {}",
                what, owner, self.user_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLock for PgCreditLock {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn available_lots(&mut self) -> Result<Vec<CreditLot>, PortError> {
        let rows: Vec<CreditLotRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credit_lots WHERE user_id = $1 AND remaining_units > 0 {} FOR UPDATE",
            LOT_COLUMNS, FIFO_ORDER
        ))
        .bind(Uuid::from(self.user_id))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(port_error)?;

        lots_from_rows(rows)
    }

    async fn lot(&mut self, lot_id: CreditLotId) -> Result<Option<CreditLot>, PortError> {
        let row: Option<CreditLotRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credit_lots WHERE lot_id = $1 AND user_id = $2 FOR UPDATE",
            LOT_COLUMNS
        ))
        .bind(Uuid::from(lot_id))
        .bind(Uuid::from(self.user_id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(port_error)?;

        row.map(CreditLot::try_from).transpose()
    }

    async fn insert_lot(&mut self, lot: &CreditLot) -> Result<(), PortError> {
        self.check_owner(lot.user_id, "credit lot")?;

        sqlx::query(&format!(
            "INSERT INTO credit_lots ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            LOT_COLUMNS
        ))
        .bind(Uuid::from(lot.id))
        .bind(Uuid::from(lot.user_id))
        .bind(lot.product_id.as_str())
        .bind(units_to_db(lot.total_units)?)
        .bind(units_to_db(lot.remaining_units)?)
        .bind(lot.purchased_at)
        .bind(lot.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn save_lot(&mut self, lot: &CreditLot) -> Result<(), PortError> {
        self.check_owner(lot.user_id, "credit lot")?;

        let result = sqlx::query(
            "UPDATE credit_lots SET remaining_units = $3 WHERE lot_id = $1 AND user_id = $2",
        )
        .bind(Uuid::from(lot.id))
        .bind(Uuid::from(lot.user_id))
        .bind(units_to_db(lot.remaining_units)?)
        .execute(&mut *self.tx)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("CreditLot", lot.id));
        }
        Ok(())
    }

    async fn usage_for_booking(&mut self, booking_id: BookingId) -> Result<Vec<CreditUsageLog>, PortError> {
        let rows: Vec<UsageLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credit_usage_log WHERE booking_id = $1 ORDER BY seq",
            USAGE_COLUMNS
        ))
        .bind(Uuid::from(booking_id))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(port_error)?;

        usage_from_rows(rows)
    }

    async fn insert_usage(&mut self, usage: &CreditUsageLog) -> Result<(), PortError> {
        let actual_minutes = usage.actual_minutes.map(units_to_db).transpose()?;

        sqlx::query(&format!(
            "INSERT INTO credit_usage_log ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            USAGE_COLUMNS
        ))
        .bind(Uuid::from(usage.id))
        .bind(Uuid::from(usage.credit_id))
        .bind(Uuid::from(usage.booking_id))
        .bind(units_to_db(usage.units_used)?)
        .bind(usage.status.as_str())
        .bind(units_to_db(usage.refunded_units)?)
        .bind(usage.used_at)
        .bind(usage.consumed_at)
        .bind(actual_minutes)
        .execute(&mut *self.tx)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn save_usage(&mut self, usage: &CreditUsageLog) -> Result<(), PortError> {
        let actual_minutes = usage.actual_minutes.map(units_to_db).transpose()?;

        let result = sqlx::query(
            "UPDATE credit_usage_log \
             SET status = $2, refunded_units = $3, consumed_at = $4, actual_minutes = $5 \
             WHERE usage_id = $1",
        )
        .bind(Uuid::from(usage.id))
        .bind(usage.status.as_str())
        .bind(units_to_db(usage.refunded_units)?)
        .bind(usage.consumed_at)
        .bind(actual_minutes)
        .execute(&mut *self.tx)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("CreditUsageLog", usage.id));
        }
        Ok(())
    }

    async fn delete_usage(&mut self, usage_id: UsageLogId) -> Result<(), PortError> {
        sqlx::query("DELETE FROM credit_usage_log WHERE usage_id = $1")
            .bind(Uuid::from(usage_id))
            .execute(&mut *self.tx)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let lock = *self;
        lock.tx.commit().await.map_err(port_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_credit::UsageStatus;

    fn lot_row(total: i32, remaining: i32) -> CreditLotRow {
        CreditLotRow {
            lot_id: Uuid::now_v7(),
            user_id: Uuid::new_v4(),
            product_id: "basic-4".to_string(),
            total_units: total,
            remaining_units: remaining,
            purchased_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_lot_row_maps_to_lot() {
        let lot = CreditLot::try_from(lot_row(4, 1)).unwrap();
        assert_eq!(lot.total_units, 4);
        assert_eq!(lot.used_units(), 3);
    }

    #[test]
    fn test_lot_row_with_overfull_remaining_is_corrupt() {
        assert!(matches!(
            CreditLot::try_from(lot_row(2, 3)),
            Err(PortError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_usage_row_maps_to_log() {
        let row = UsageLogRow {
            usage_id: Uuid::now_v7(),
            credit_id: Uuid::now_v7(),
            booking_id: Uuid::new_v4(),
            units_used: 2,
            status: "PARTIAL_REFUND".to_string(),
            refunded_units: 1,
            used_at: Utc::now(),
            consumed_at: Some(Utc::now()),
            actual_minutes: Some(25),
        };

        let log = CreditUsageLog::try_from(row).unwrap();
        assert_eq!(log.status, UsageStatus::PartialRefund);
        assert_eq!(log.consumed_units(), 1);
        assert_eq!(log.actual_minutes, Some(25));
    }
}
