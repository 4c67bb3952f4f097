//! Core Kernel - Foundational types for the consultation ledger
//!
//! This crate provides the building blocks shared by the ledger, credit and
//! settlement domains:
//! - Strongly-typed identifiers
//! - Integer cash amounts and the platform commission rate
//! - Calendar settlement periods resolved in an operating timezone
//! - Port error and marker traits for the adapter layer

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{
    Cash, CommissionRate, EarningsSplit, MoneyError,
    CREDIT_UNIT_PRICE, DEFAULT_COMMISSION_RATE, MINUTES_PER_CREDIT,
};
pub use temporal::{SettlementPeriod, TemporalError, Timezone};
pub use identifiers::{
    IdParseError,
    UserId, CounselorId, BookingId, SessionId, CashTransactionId,
    CreditLotId, UsageLogId, SettlementTransactionId, CounselorSettlementId,
};
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError};
pub use error::CoreError;
