//! In-process settlement adapters
//!
//! [`InMemorySettlementStore`] shares an [`InMemoryCreditStore`] so that a
//! settlement scope can fold the customer's credit changes into its own
//! commit.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use core_kernel::{
    BookingId, CounselorId, DomainPort, HealthCheckResult, HealthCheckable, PortError, SessionId,
    SettlementPeriod,
};
use domain_credit::{CreditLock, InMemoryCreditStore, MemoryCreditLock};

use crate::counselor::{CounselorSettlement, SettlementStatus};
use crate::ports::{BookingContext, BookingDirectory, SettlementKey, SettlementScope, SettlementStore};
use crate::settlement::SettlementTransaction;

/// Booking directory backed by a map, for tests and local runs
#[derive(Default)]
pub struct InMemoryBookingDirectory {
    bookings: RwLock<HashMap<BookingId, BookingContext>>,
}

impl InMemoryBookingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, booking: BookingContext) {
        self.bookings.write().await.insert(booking.booking_id, booking);
    }
}

impl DomainPort for InMemoryBookingDirectory {}

#[async_trait]
impl BookingDirectory for InMemoryBookingDirectory {
    async fn find_booking(&self, booking_id: BookingId) -> Result<Option<BookingContext>, PortError> {
        Ok(self.bookings.read().await.get(&booking_id).cloned())
    }
}

type MonthKey = (CounselorId, NaiveDate);

/// Hands out one async mutex per key
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Default)]
struct SettlementData {
    transactions: Vec<SettlementTransaction>,
    by_session: HashMap<SessionId, usize>,
    months: HashMap<MonthKey, CounselorSettlement>,
}

struct SettlementTables {
    sessions: KeyedLocks<SessionId>,
    months: KeyedLocks<MonthKey>,
    data: Mutex<SettlementData>,
}

/// Settlement store kept in process memory
#[derive(Clone)]
pub struct InMemorySettlementStore {
    credits: InMemoryCreditStore,
    tables: Arc<SettlementTables>,
}

impl InMemorySettlementStore {
    pub fn new(credits: InMemoryCreditStore) -> Self {
        Self {
            credits,
            tables: Arc::new(SettlementTables {
                sessions: KeyedLocks::new(),
                months: KeyedLocks::new(),
                data: Mutex::new(SettlementData::default()),
            }),
        }
    }
}

impl DomainPort for InMemorySettlementStore {}

#[async_trait]
impl HealthCheckable for InMemorySettlementStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-settlement")
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlementStore {
    async fn begin(&self, key: SettlementKey) -> Result<Box<dyn SettlementScope>, PortError> {
        let session_guard = self.tables.sessions.acquire(key.session_id).await;
        let credits = self.credits.lock_user(key.customer_id).await;
        let month_guard = self
            .tables
            .months
            .acquire((key.counselor_id, key.period.start()))
            .await;
        debug!(session_id = %key.session_id, "In-memory settlement scope opened");

        Ok(Box::new(MemorySettlementScope {
            _session_guard: session_guard,
            _month_guard: month_guard,
            key,
            credits,
            month: None,
            transaction: None,
            tables: Arc::clone(&self.tables),
        }))
    }

    async fn find_by_session(&self, session_id: SessionId) -> Result<Option<SettlementTransaction>, PortError> {
        let data = self.tables.data.lock().await;
        Ok(data
            .by_session
            .get(&session_id)
            .and_then(|index| data.transactions.get(*index))
            .cloned())
    }

    async fn counselor_settlement(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> Result<Option<CounselorSettlement>, PortError> {
        let data = self.tables.data.lock().await;
        Ok(data.months.get(&(counselor_id, period.start())).cloned())
    }

    async fn counselor_settlements(&self, counselor_id: CounselorId) -> Result<Vec<CounselorSettlement>, PortError> {
        let data = self.tables.data.lock().await;
        let mut months: Vec<CounselorSettlement> = data
            .months
            .values()
            .filter(|month| month.counselor_id == counselor_id)
            .cloned()
            .collect();
        months.sort_by_key(|month| month.period);
        Ok(months)
    }

    async fn session_settlements(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> Result<Vec<SettlementTransaction>, PortError> {
        let data = self.tables.data.lock().await;
        Ok(data
            .transactions
            .iter()
            .filter(|tx| tx.counselor_id == counselor_id && tx.period_start == period.start())
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        settlement: &CounselorSettlement,
        expected: SettlementStatus,
    ) -> Result<(), PortError> {
        let key = (settlement.counselor_id, settlement.period.start());
        let _month_guard = self.tables.months.acquire(key).await;

        let mut data = self.tables.data.lock().await;
        let stored = data
            .months
            .get_mut(&key)
            .ok_or_else(|| PortError::not_found("CounselorSettlement", settlement.id))?;
        if stored.status != expected {
            return Err(PortError::conflict(format!(
                "settlement {} is {}, expected {}",
                stored.id, stored.status, expected
            )));
        }
        stored.status = settlement.status;
        stored.confirmed_at = settlement.confirmed_at;
        stored.paid_at = settlement.paid_at;
        stored.updated_at = settlement.updated_at;
        Ok(())
    }
}

/// Unit of work for one in-memory settlement
pub struct MemorySettlementScope {
    _session_guard: OwnedMutexGuard<()>,
    _month_guard: OwnedMutexGuard<()>,
    key: SettlementKey,
    credits: MemoryCreditLock,
    month: Option<CounselorSettlement>,
    transaction: Option<SettlementTransaction>,
    tables: Arc<SettlementTables>,
}

#[async_trait]
impl SettlementScope for MemorySettlementScope {
    async fn existing(&mut self) -> Result<Option<SettlementTransaction>, PortError> {
        let data = self.tables.data.lock().await;
        Ok(data
            .by_session
            .get(&self.key.session_id)
            .and_then(|index| data.transactions.get(*index))
            .cloned())
    }

    fn credits(&mut self) -> &mut dyn CreditLock {
        &mut self.credits
    }

    async fn counselor_settlement(&mut self) -> Result<Option<CounselorSettlement>, PortError> {
        if let Some(month) = &self.month {
            return Ok(Some(month.clone()));
        }
        let data = self.tables.data.lock().await;
        Ok(data
            .months
            .get(&(self.key.counselor_id, self.key.period.start()))
            .cloned())
    }

    async fn save_counselor_settlement(&mut self, settlement: &CounselorSettlement) -> Result<(), PortError> {
        if settlement.counselor_id != self.key.counselor_id || settlement.period != self.key.period {
            return Err(PortError::internal("settlement month outside the scope's lock"));
        }
        self.month = Some(settlement.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &SettlementTransaction) -> Result<(), PortError> {
        if transaction.session_id != self.key.session_id {
            return Err(PortError::internal("settlement session outside the scope's lock"));
        }
        self.transaction = Some(transaction.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let this = *self;
        let mut data = this.tables.data.lock().await;
        if data.by_session.contains_key(&this.key.session_id) {
            return Err(PortError::conflict(format!(
                "session {} already settled",
                this.key.session_id
            )));
        }

        Box::new(this.credits).commit().await?;

        if let Some(month) = this.month {
            data.months.insert((month.counselor_id, month.period.start()), month);
        }
        if let Some(transaction) = this.transaction {
            let index = data.transactions.len();
            data.by_session.insert(transaction.session_id, index);
            data.transactions.push(transaction);
        }
        Ok(())
    }
}
