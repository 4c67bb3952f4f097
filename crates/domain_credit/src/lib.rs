//! Credit Domain - Prepaid Consultation Credits
//!
//! Users buy credits in lots; one unit buys thirty minutes of consultation.
//! This crate provides:
//!
//! - [`CreditLot`] and [`CreditUsageLog`] entities
//! - FIFO allocation of a reservation across lots
//! - [`CreditInventory`] for reserve/release under the owner's lock
//! - [`CreditPurchaseService`] tying a cash debit to lot creation
//!
//! Conservation: for every booking, the units on its usage logs equal the
//! units reserved, and every unit is either remaining on a lot or recorded
//! on exactly one usage log.

pub mod lot;
pub mod usage;
pub mod allocation;
pub mod inventory;
pub mod purchase;
pub mod ports;
pub mod memory;
pub mod error;

pub use lot::{CreditBalance, CreditLot};
pub use usage::{CreditUsageLog, UsageStatus};
pub use allocation::{allocate_fifo, Allocation};
pub use inventory::CreditInventory;
pub use purchase::{CreditProduct, CreditPurchase, CreditPurchaseService};
pub use ports::{CreditLock, CreditStore};
pub use memory::{InMemoryCreditStore, MemoryCreditLock};
pub use error::{CreditError, CreditResult};
