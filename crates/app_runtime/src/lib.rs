//! Application runtime for the consultation ledger
//!
//! Loads [`AppConfig`] from the environment, installs the tracing
//! subscriber and wires the ledger, credit inventory and settlement engine
//! onto the configured storage backend.

pub mod config;
pub mod error;
pub mod services;
pub mod telemetry;

pub use config::{AppConfig, LogFormat, StorageBackend};
pub use error::RuntimeError;
pub use services::Services;
pub use telemetry::init_tracing;
