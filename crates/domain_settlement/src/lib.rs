//! Settlement Domain - Session Reconciliation and Counselor Earnings
//!
//! When a consultation ends, the [`SettlementEngine`]:
//!
//! 1. classifies the outcome into consumed and refunded credit units
//! 2. reconciles the booking's usage logs and returns refunded units to lots
//! 3. splits the consumed value into counselor earning and platform fee
//! 4. folds the result into the counselor's monthly settlement
//!
//! all in one unit of work, at most once per session. The monthly settlement
//! then moves through the operator workflow `PENDING → CONFIRMED → PAID`.

pub mod session;
pub mod outcome;
pub mod reconcile;
pub mod settlement;
pub mod counselor;
pub mod policy;
pub mod engine;
pub mod ports;
pub mod memory;
pub mod error;

pub use session::{billable_minutes, EndReason, FinishedSession};
pub use outcome::{classify, units_for_duration, SettlementOutcome, SettlementType, NETWORK_GRACE_SECS};
pub use reconcile::refund_per_log;
pub use settlement::SettlementTransaction;
pub use counselor::{CounselorSettlement, SettlementStatus};
pub use policy::SettlementPolicy;
pub use engine::SettlementEngine;
pub use ports::{BookingContext, BookingDirectory, SettlementKey, SettlementScope, SettlementStore};
pub use memory::{InMemoryBookingDirectory, InMemorySettlementStore, MemorySettlementScope};
pub use error::{SettlementError, SettlementResult};
