//! In-process credit adapter
//!
//! One async mutex per user stands in for the row locks the PostgreSQL
//! adapter takes. A [`MemoryCreditLock`] snapshots the owner's lots when it
//! is acquired and stages usage-log changes until commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use core_kernel::{
    BookingId, CreditLotId, DomainPort, HealthCheckResult, HealthCheckable, PortError, UsageLogId,
    UserId,
};

use crate::lot::CreditLot;
use crate::ports::{CreditLock, CreditStore};
use crate::usage::CreditUsageLog;

#[derive(Default)]
struct CreditData {
    lots: HashMap<CreditLotId, CreditLot>,
    usage: Vec<CreditUsageLog>,
}

#[derive(Default)]
struct CreditTables {
    owners: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    data: Mutex<CreditData>,
}

fn sort_fifo(lots: &mut [CreditLot]) {
    lots.sort_by_key(|lot| lot.fifo_key());
}

/// Credit store kept in process memory
#[derive(Clone, Default)]
pub struct InMemoryCreditStore {
    tables: Arc<CreditTables>,
}

impl InMemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the owner's lock and returns the concrete lock type, so other
    /// in-process adapters can fold credit changes into their own unit of
    /// work
    pub async fn lock_user(&self, user_id: UserId) -> MemoryCreditLock {
        let owner = {
            let mut owners = self.tables.owners.lock().await;
            owners.entry(user_id).or_default().clone()
        };
        let guard = owner.lock_owned().await;
        debug!(%user_id, "In-memory credit lock acquired");

        let lots: HashMap<CreditLotId, CreditLot> = {
            let data = self.tables.data.lock().await;
            data.lots
                .values()
                .filter(|lot| lot.user_id == user_id)
                .map(|lot| (lot.id, lot.clone()))
                .collect()
        };

        MemoryCreditLock {
            _guard: guard,
            user_id,
            lots,
            inserted_usage: Vec::new(),
            updated_usage: HashMap::new(),
            deleted_usage: HashSet::new(),
            tables: Arc::clone(&self.tables),
        }
    }
}

impl DomainPort for InMemoryCreditStore {}

#[async_trait]
impl HealthCheckable for InMemoryCreditStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-credit")
    }
}

#[async_trait]
impl CreditStore for InMemoryCreditStore {
    async fn lock_owner(&self, user_id: UserId) -> Result<Box<dyn CreditLock>, PortError> {
        Ok(Box::new(self.lock_user(user_id).await))
    }

    async fn booking_owner(&self, booking_id: BookingId) -> Result<Option<UserId>, PortError> {
        let data = self.tables.data.lock().await;
        Ok(data
            .usage
            .iter()
            .find(|usage| usage.booking_id == booking_id)
            .and_then(|usage| data.lots.get(&usage.credit_id))
            .map(|lot| lot.user_id))
    }

    async fn lots_for_user(&self, user_id: UserId) -> Result<Vec<CreditLot>, PortError> {
        let data = self.tables.data.lock().await;
        let mut lots: Vec<CreditLot> = data
            .lots
            .values()
            .filter(|lot| lot.user_id == user_id)
            .cloned()
            .collect();
        sort_fifo(&mut lots);
        Ok(lots)
    }

    async fn usage_for_booking(&self, booking_id: BookingId) -> Result<Vec<CreditUsageLog>, PortError> {
        let data = self.tables.data.lock().await;
        Ok(data
            .usage
            .iter()
            .filter(|usage| usage.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

/// Exclusive hold on one user's in-memory credit lots
pub struct MemoryCreditLock {
    _guard: OwnedMutexGuard<()>,
    user_id: UserId,
    lots: HashMap<CreditLotId, CreditLot>,
    inserted_usage: Vec<CreditUsageLog>,
    updated_usage: HashMap<UsageLogId, CreditUsageLog>,
    deleted_usage: HashSet<UsageLogId>,
    tables: Arc<CreditTables>,
}

#[async_trait]
impl CreditLock for MemoryCreditLock {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn available_lots(&mut self) -> Result<Vec<CreditLot>, PortError> {
        let mut lots: Vec<CreditLot> = self
            .lots
            .values()
            .filter(|lot| !lot.is_exhausted())
            .cloned()
            .collect();
        sort_fifo(&mut lots);
        Ok(lots)
    }

    async fn lot(&mut self, lot_id: CreditLotId) -> Result<Option<CreditLot>, PortError> {
        Ok(self.lots.get(&lot_id).cloned())
    }

    async fn insert_lot(&mut self, lot: &CreditLot) -> Result<(), PortError> {
        if lot.user_id != self.user_id {
            return Err(PortError::internal(format!(
                "lot {} does not belong to {}",
                lot.id, self.user_id
            )));
        }
        if self.lots.contains_key(&lot.id) {
            return Err(PortError::conflict(format!("credit lot {} already exists", lot.id)));
        }
        self.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn save_lot(&mut self, lot: &CreditLot) -> Result<(), PortError> {
        match self.lots.get_mut(&lot.id) {
            Some(existing) => {
                *existing = lot.clone();
                Ok(())
            }
            None => Err(PortError::not_found("CreditLot", lot.id)),
        }
    }

    async fn usage_for_booking(&mut self, booking_id: BookingId) -> Result<Vec<CreditUsageLog>, PortError> {
        let data = self.tables.data.lock().await;
        let committed = data
            .usage
            .iter()
            .filter(|usage| usage.booking_id == booking_id && !self.deleted_usage.contains(&usage.id))
            .map(|usage| self.updated_usage.get(&usage.id).unwrap_or(usage).clone());
        let staged = self
            .inserted_usage
            .iter()
            .filter(|usage| usage.booking_id == booking_id && !self.deleted_usage.contains(&usage.id))
            .cloned();
        Ok(committed.chain(staged).collect())
    }

    async fn insert_usage(&mut self, usage: &CreditUsageLog) -> Result<(), PortError> {
        self.inserted_usage.push(usage.clone());
        Ok(())
    }

    async fn save_usage(&mut self, usage: &CreditUsageLog) -> Result<(), PortError> {
        if let Some(staged) = self.inserted_usage.iter_mut().find(|staged| staged.id == usage.id) {
            *staged = usage.clone();
        } else {
            self.updated_usage.insert(usage.id, usage.clone());
        }
        Ok(())
    }

    async fn delete_usage(&mut self, usage_id: UsageLogId) -> Result<(), PortError> {
        self.deleted_usage.insert(usage_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let this = *self;
        let mut data = this.tables.data.lock().await;

        data.lots.extend(this.lots);
        data.usage.retain(|usage| !this.deleted_usage.contains(&usage.id));
        for usage in data.usage.iter_mut() {
            if let Some(updated) = this.updated_usage.get(&usage.id) {
                *usage = updated.clone();
            }
        }
        data.usage.extend(
            this.inserted_usage
                .into_iter()
                .filter(|usage| !this.deleted_usage.contains(&usage.id)),
        );
        Ok(())
    }
}
