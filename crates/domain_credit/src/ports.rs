//! Credit Domain Ports
//!
//! All lot and usage-log mutation for one user happens under a
//! [`CreditLock`], the user's exclusive lock over their lots. Reads and
//! writes go through the lock's working state and become visible on
//! `commit`; dropping the lock discards them.

use async_trait::async_trait;

use core_kernel::{BookingId, CreditLotId, DomainPort, HealthCheckable, PortError, UsageLogId, UserId};

use crate::lot::CreditLot;
use crate::usage::CreditUsageLog;

/// Persistence port for credit lots and usage logs
#[async_trait]
pub trait CreditStore: DomainPort + HealthCheckable {
    /// Takes the user's exclusive lock over their credit lots
    async fn lock_owner(&self, user_id: UserId) -> Result<Box<dyn CreditLock>, PortError>;

    /// Owner of the lots a booking's usage logs point at, if it has any
    async fn booking_owner(&self, booking_id: BookingId) -> Result<Option<UserId>, PortError>;

    /// All of a user's lots in FIFO order
    async fn lots_for_user(&self, user_id: UserId) -> Result<Vec<CreditLot>, PortError>;

    /// A booking's usage logs in reservation order
    async fn usage_for_booking(&self, booking_id: BookingId) -> Result<Vec<CreditUsageLog>, PortError>;
}

/// Exclusive hold on one user's credit lots
#[async_trait]
pub trait CreditLock: Send {
    fn user_id(&self) -> UserId;

    /// Lots with remaining units, oldest purchase first
    async fn available_lots(&mut self) -> Result<Vec<CreditLot>, PortError>;

    /// One of the owner's lots; `None` if it does not exist or belongs to
    /// someone else
    async fn lot(&mut self, lot_id: CreditLotId) -> Result<Option<CreditLot>, PortError>;

    async fn insert_lot(&mut self, lot: &CreditLot) -> Result<(), PortError>;

    async fn save_lot(&mut self, lot: &CreditLot) -> Result<(), PortError>;

    /// A booking's usage logs in reservation order, including staged changes
    async fn usage_for_booking(&mut self, booking_id: BookingId) -> Result<Vec<CreditUsageLog>, PortError>;

    async fn insert_usage(&mut self, usage: &CreditUsageLog) -> Result<(), PortError>;

    async fn save_usage(&mut self, usage: &CreditUsageLog) -> Result<(), PortError>;

    async fn delete_usage(&mut self, usage_id: UsageLogId) -> Result<(), PortError>;

    /// Publishes every staged change atomically
    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}
