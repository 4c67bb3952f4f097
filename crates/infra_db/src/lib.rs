//! Infrastructure Database Layer
//!
//! PostgreSQL adapters for the marketplace's financial core, built on SQLx:
//!
//! - [`PgLedgerStore`]: wallets and the append-only cash journal
//! - [`PgCreditStore`]: credit lots and usage logs
//! - [`PgSettlementStore`]: per-session settlements and monthly counselor
//!   aggregates
//! - [`PgBookingDirectory`]: the booking facts settlement reads
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/marketplace")).await?;
//! run_migrations(&pool).await?;
//! let store = PgLedgerStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod migrate;
pub mod adapters;

pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use migrate::run_migrations;
pub use adapters::{
    PgBookingDirectory, PgCreditLock, PgCreditStore, PgLedgerStore, PgSettlementScope,
    PgSettlementStore, PgWalletLock,
};
