//! Shared test support for the marketplace ledger
//!
//! Everything is re-exported at the crate root, so a test usually starts
//! with `use test_utils::*;`.
//!
//! - [`fixtures`]: products, cash amounts, calendar months, policies, fixed ids
//! - [`builders`]: bookings, finished sessions and credit lots
//! - [`harness`]: [`TestMarketplace`], the wired core with one-line journey steps
//! - [`database`]: migrated PostgreSQL containers
//! - [`assertions`]: ledger, lot and settlement invariant checks
//! - [`generators`]: proptest strategies

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;
pub mod harness;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::*;
