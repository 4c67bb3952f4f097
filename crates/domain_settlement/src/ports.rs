//! Settlement Domain Ports
//!
//! Settling a session writes three things that must land together: the
//! customer's usage logs and lots, the counselor's monthly aggregate, and
//! the per-session settlement row. A [`SettlementScope`] is that unit of
//! work. Opening one takes, in this order:
//!
//! 1. the per-session guard, so one session is settled by one worker
//! 2. the customer's credit lock
//! 3. the counselor's monthly aggregate lock
//!
//! Every writer acquires them in the same order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{
    BookingId, CounselorId, DomainPort, HealthCheckable, PortError, SessionId, SettlementPeriod,
    UserId,
};
use domain_credit::CreditLock;

use crate::counselor::{CounselorSettlement, SettlementStatus};
use crate::settlement::SettlementTransaction;

/// What settlement needs to know about a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingContext {
    pub booking_id: BookingId,
    pub customer_id: UserId,
    pub counselor_id: CounselorId,
    pub credits_reserved: u32,
}

/// Read access to the booking service's records
#[async_trait]
pub trait BookingDirectory: DomainPort {
    async fn find_booking(&self, booking_id: BookingId) -> Result<Option<BookingContext>, PortError>;
}

/// Identifies the locks a settlement scope takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementKey {
    pub session_id: SessionId,
    pub customer_id: UserId,
    pub counselor_id: CounselorId,
    pub period: SettlementPeriod,
}

/// Persistence port for settlements
#[async_trait]
pub trait SettlementStore: DomainPort + HealthCheckable {
    /// Opens a unit of work for settling one session
    async fn begin(&self, key: SettlementKey) -> Result<Box<dyn SettlementScope>, PortError>;

    async fn find_by_session(&self, session_id: SessionId) -> Result<Option<SettlementTransaction>, PortError>;

    async fn counselor_settlement(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> Result<Option<CounselorSettlement>, PortError>;

    /// Every month on record for the counselor, oldest first
    async fn counselor_settlements(&self, counselor_id: CounselorId) -> Result<Vec<CounselorSettlement>, PortError>;

    /// Sessions folded into one month, in settlement order
    async fn session_settlements(
        &self,
        counselor_id: CounselorId,
        period: SettlementPeriod,
    ) -> Result<Vec<SettlementTransaction>, PortError>;

    /// Writes a workflow status change if the stored status still equals
    /// `expected`; returns `PortError::Conflict` otherwise
    async fn update_status(
        &self,
        settlement: &CounselorSettlement,
        expected: SettlementStatus,
    ) -> Result<(), PortError>;
}

/// One session's settlement unit of work
///
/// Nothing is visible to other callers before `commit`; dropping the scope
/// rolls everything back, credit changes included.
#[async_trait]
pub trait SettlementScope: Send {
    /// Settlement already recorded for the session, read under its guard
    async fn existing(&mut self) -> Result<Option<SettlementTransaction>, PortError>;

    /// The customer's credit lock, sharing this scope's unit of work
    fn credits(&mut self) -> &mut dyn CreditLock;

    /// The counselor's aggregate for the scope's month, if opened yet
    async fn counselor_settlement(&mut self) -> Result<Option<CounselorSettlement>, PortError>;

    async fn save_counselor_settlement(&mut self, settlement: &CounselorSettlement) -> Result<(), PortError>;

    /// May return `PortError::Conflict` if the session already has a row
    async fn insert_transaction(&mut self, transaction: &SettlementTransaction) -> Result<(), PortError>;

    /// Returns `PortError::Conflict` if the session was settled concurrently
    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}
