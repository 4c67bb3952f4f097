//! Kernel-level errors
//!
//! Domain crates carry their own error enums; [`CoreError`] covers what is
//! shared below them: money arithmetic, calendar periods and start-up
//! configuration.

use thiserror::Error;

use crate::money::MoneyError;
use crate::temporal::TemporalError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    #[error("Invalid value: {0}")]
    Validation(String),

    /// A setting that cannot run the marketplace, caught before any service starts
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}
