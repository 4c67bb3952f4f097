//! Runtime errors

use thiserror::Error;

use core_kernel::CoreError;
use infra_db::DatabaseError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to install tracing subscriber: {0}")]
    Telemetry(String),
}
