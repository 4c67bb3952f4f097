//! Ports and Adapters Infrastructure
//!
//! Each domain crate defines port traits for its persistence needs and ships
//! an in-process adapter; `infra_db` provides the PostgreSQL adapters. This
//! module holds the pieces every port shares.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        LedgerService / CreditInventory / SettlementEngine    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │      LedgerStore / CreditStore / SettlementStore ports       │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │ In-process adapter│     │ PostgreSQL      │
//!         │ (per-owner mutex) │     │ (row locks)     │
//!         └───────────────────┘     └─────────────────┘
//! ```
//!
//! Mutating port operations hand out a *lock* object: it holds the owner's
//! exclusive lock, exposes reads and writes against a working state, and
//! publishes nothing until `commit`. Dropping a lock rolls back.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a store adapter
///
/// Services branch on the kind, never on the backend: `Conflict` means a
/// uniqueness guarantee fired (idempotency key, session id, status CAS),
/// `Contention` means the write lost a lock race and may be retried.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Lock wait timed out or the backend aborted a deadlock
    #[error("Lock contention: {message}")]
    Contention { message: String },

    /// A stored value no longer maps onto a domain type
    #[error("Corrupt record: {message}")]
    Corrupt { message: String },

    #[error("Store unavailable: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Source>,
    },

    #[error("Store failure: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Source>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict { message: message.into() }
    }

    pub fn contention(message: impl Into<String>) -> Self {
        PortError::Contention { message: message.into() }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        PortError::Corrupt { message: message.into() }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection { message: message.into(), source: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal { message: message.into(), source: None }
    }

    /// Whether retrying the whole operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Contention { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Implemented by every store and directory trait
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Reachable but slower than [`HealthCheckResult::DEGRADED_AFTER`]
    Degraded,
    Unhealthy,
}

/// Outcome of one adapter probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub const DEGRADED_AFTER: Duration = Duration::from_secs(1);

    /// Result for in-process adapters, which have nothing to probe
    pub fn healthy(adapter_id: impl Into<String>) -> Self {
        Self::timed(adapter_id, Duration::ZERO)
    }

    /// A successful probe, degraded if it took too long
    pub fn timed(adapter_id: impl Into<String>, latency: Duration) -> Self {
        let status = if latency > Self::DEGRADED_AFTER {
            AdapterHealth::Degraded
        } else {
            AdapterHealth::Healthy
        };
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn failed(adapter_id: impl Into<String>, latency: Duration, message: impl Into<String>) -> Self {
        Self {
            status: AdapterHealth::Unhealthy,
            message: Some(message.into()),
            ..Self::timed(adapter_id, latency)
        }
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
