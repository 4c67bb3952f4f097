//! PostgreSQL adapters for the domain ports
//!
//! Each adapter implements one domain port on top of a [`PgPool`]. Lock
//! objects handed out by the ports wrap an open database transaction, so
//! "commit" and "drop to roll back" map directly onto `COMMIT` and
//! `ROLLBACK`.
//!
//! Exclusive owner locks are transaction-scoped advisory locks keyed by a
//! lock class and the owner's id, taken in the order the domain ports
//! document.
//!
//! ```rust,ignore
//! use infra_db::adapters::{PgCreditStore, PgLedgerStore};
//! use std::sync::Arc;
//!
//! let ledger = LedgerService::new(Arc::new(PgLedgerStore::new(pool.clone())));
//! let inventory = CreditInventory::new(Arc::new(PgCreditStore::new(pool)));
//! ```

use std::time::Instant;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use core_kernel::{HealthCheckResult, PortError};

use crate::error::port_error;

pub mod booking;
pub mod credit;
pub mod ledger;
pub mod settlement;

pub use booking::PgBookingDirectory;
pub use credit::{PgCreditLock, PgCreditStore};
pub use ledger::{PgLedgerStore, PgWalletLock};
pub use settlement::{PgSettlementScope, PgSettlementStore};

/// Advisory lock classes, one per kind of owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub(crate) enum LockClass {
    CreditOwner = 1,
    Session = 2,
    CounselorMonth = 3,
}

/// Takes a transaction-scoped advisory lock, released on commit or rollback
pub(crate) async fn advisory_lock(
    tx: &mut Transaction<'static, Postgres>,
    class: LockClass,
    key: &str,
) -> Result<(), PortError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
        .bind(class as i32)
        .bind(key)
        .execute(&mut **tx)
        .await
        .map_err(port_error)?;
    Ok(())
}

pub(crate) fn owner_key(id: Uuid) -> String {
    id.simple().to_string()
}

/// Unit counts are stored as INTEGER
pub(crate) fn units_to_db(units: u32) -> Result<i32, PortError> {
    i32::try_from(units).map_err(|_| PortError::internal(format!("unit count out of range: {}", units)))
}

pub(crate) fn units_from_db(units: i32, column: &str) -> Result<u32, PortError> {
    u32::try_from(units).map_err(|_| PortError::corrupt(format!("negative {}: {}", column, units)))
}

/// Probes the pool with `SELECT 1`
pub(crate) async fn probe(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = Instant::now();
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheckResult::timed(adapter_id, start.elapsed()),
        Err(e) => HealthCheckResult::failed(adapter_id, start.elapsed(), format!("probe failed: {}", e)),
    }
}
