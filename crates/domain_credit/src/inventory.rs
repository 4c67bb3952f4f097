//! Credit Inventory
//!
//! Reservation and release of credit units for bookings. Both operations run
//! entirely under the owner's credit lock, so a reservation is either fully
//! written (every lot deduction plus one usage log per lot) or not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use core_kernel::{BookingId, UserId};

use crate::allocation::allocate_fifo;
use crate::error::{CreditError, CreditResult};
use crate::lot::{CreditBalance, CreditLot};
use crate::ports::CreditStore;
use crate::usage::CreditUsageLog;

/// Credit inventory service
#[derive(Clone)]
pub struct CreditInventory {
    store: Arc<dyn CreditStore>,
}

impl CreditInventory {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    /// Adds a freshly purchased lot
    #[instrument(skip(self))]
    pub async fn add_lot(
        &self,
        user_id: UserId,
        product_id: &str,
        units: u32,
        purchased_at: DateTime<Utc>,
    ) -> CreditResult<CreditLot> {
        let lot = CreditLot::new(user_id, product_id, units, purchased_at)?;

        let mut lock = self.store.lock_owner(user_id).await?;
        lock.insert_lot(&lot).await?;
        lock.commit().await?;

        info!(lot_id = %lot.id, "Credit lot added");
        Ok(lot)
    }

    /// Reserves `units` for a booking, oldest lots first
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `units` is zero
    /// - `InsufficientCredits` if the user's lots cannot cover the request;
    ///   nothing is reserved
    /// - `AlreadyReserved` if the booking already holds usage logs
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        units: u32,
    ) -> CreditResult<Vec<CreditUsageLog>> {
        if units == 0 {
            return Err(CreditError::invalid("units must be positive"));
        }

        let mut lock = self.store.lock_owner(user_id).await?;
        debug!("Credit lock acquired");

        if !lock.usage_for_booking(booking_id).await?.is_empty() {
            warn!("Booking already holds a reservation");
            return Err(CreditError::AlreadyReserved(booking_id));
        }

        let lots = lock.available_lots().await?;
        let plan = match allocate_fifo(&lots, units) {
            Ok(plan) => plan,
            Err(err) => {
                warn!("Reservation rejected: {}", err);
                return Err(err);
            }
        };

        let mut logs = Vec::with_capacity(plan.len());
        for allocation in plan {
            let mut lot = lots
                .iter()
                .find(|lot| lot.id == allocation.lot_id)
                .cloned()
                .ok_or(CreditError::LotNotFound(allocation.lot_id))?;
            lot.take(allocation.units)?;
            lock.save_lot(&lot).await?;

            let usage = CreditUsageLog::reserved(lot.id, booking_id, allocation.units);
            lock.insert_usage(&usage).await?;
            logs.push(usage);
        }
        lock.commit().await?;

        info!(lots_touched = logs.len(), "Credits reserved");
        Ok(logs)
    }

    /// Undoes a booking's reservation, restoring every unit to its lot
    ///
    /// Releasing a booking without usage logs is a no-op. Returns the number
    /// of units restored.
    ///
    /// # Errors
    ///
    /// - `AlreadySettled` if settlement already reconciled the logs
    /// - `LotNotFound` if a log points at a missing lot
    #[instrument(skip(self))]
    pub async fn release(&self, booking_id: BookingId) -> CreditResult<u32> {
        let Some(owner) = self.store.booking_owner(booking_id).await? else {
            debug!("Nothing reserved for booking");
            return Ok(0);
        };

        let mut lock = self.store.lock_owner(owner).await?;
        let logs = lock.usage_for_booking(booking_id).await?;
        if logs.is_empty() {
            debug!("Reservation already released");
            return Ok(0);
        }
        if logs.iter().any(|log| !log.is_reserved()) {
            warn!("Release refused for a settled booking");
            return Err(CreditError::AlreadySettled(booking_id));
        }

        let mut restored = 0;
        for log in &logs {
            let mut lot = lock
                .lot(log.credit_id)
                .await?
                .ok_or(CreditError::LotNotFound(log.credit_id))?;
            lot.restore(log.units_used)?;
            lock.save_lot(&lot).await?;
            lock.delete_usage(log.id).await?;
            restored += log.units_used;
        }
        lock.commit().await?;

        info!(units = restored, "Reservation released");
        Ok(restored)
    }

    /// Total, used and remaining units across the user's lots
    pub async fn summary(&self, user_id: UserId) -> CreditResult<CreditBalance> {
        let lots = self.store.lots_for_user(user_id).await?;
        Ok(CreditBalance::from_lots(&lots))
    }

    pub async fn lots(&self, user_id: UserId) -> CreditResult<Vec<CreditLot>> {
        Ok(self.store.lots_for_user(user_id).await?)
    }

    pub async fn usage_for_booking(&self, booking_id: BookingId) -> CreditResult<Vec<CreditUsageLog>> {
        Ok(self.store.usage_for_booking(booking_id).await?)
    }
}
