//! Runtime configuration
//!
//! Every field can be set through a `MARKETPLACE_`-prefixed environment
//! variable, e.g. `MARKETPLACE_DATABASE_URL` or `MARKETPLACE_COMMISSION_PERCENT`.
//! Unset fields keep their defaults.

use std::time::Duration;

use serde::Deserialize;

use core_kernel::{Cash, CommissionRate, CoreError, Timezone, CREDIT_UNIT_PRICE};
use domain_settlement::SettlementPolicy;
use infra_db::DatabaseConfig;

const ENV_PREFIX: &str = "MARKETPLACE";

/// Where the ledger keeps its state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local stores, lost on exit
    Memory,
    Postgres,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageBackend,
    /// PostgreSQL connection string, used with the `postgres` backend
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    /// Longest wait for a wallet, credit or settlement lock
    pub lock_timeout_ms: u64,
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    /// Cash value of one consumed credit unit
    pub credit_unit_price: Cash,
    /// Platform commission in whole percent
    pub commission_percent: u32,
    /// IANA timezone in which settlement months are cut
    pub settlement_timezone: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            database_url: "postgres://localhost/marketplace".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 30,
            lock_timeout_ms: 5_000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            credit_unit_price: CREDIT_UNIT_PRICE,
            commission_percent: 20,
            settlement_timezone: "UTC".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment, reading a `.env`
    /// file first when one is present
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads configuration from an explicit environment source
    pub fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Checks the values that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.credit_unit_price <= 0 {
            return Err(CoreError::configuration(format!(
                "credit_unit_price must be positive, got {}",
                self.credit_unit_price
            )));
        }
        if self.commission_percent > 100 {
            return Err(CoreError::configuration(format!(
                "commission_percent must be within 0..=100, got {}",
                self.commission_percent
            )));
        }
        self.timezone()?;

        if self.storage == StorageBackend::Postgres {
            if self.database_url.trim().is_empty() {
                return Err(CoreError::configuration("database_url is required for postgres storage"));
            }
            if self.lock_timeout_ms == 0 {
                // zero disables the timeout in PostgreSQL
                return Err(CoreError::configuration("lock_timeout_ms must be positive"));
            }
            if self.max_connections == 0 || self.min_connections > self.max_connections {
                return Err(CoreError::configuration(format!(
                    "invalid pool size: min {} max {}",
                    self.min_connections, self.max_connections
                )));
            }
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Timezone, CoreError> {
        Ok(self.settlement_timezone.parse::<Timezone>()?)
    }

    /// The settlement policy described by this configuration
    pub fn settlement_policy(&self) -> Result<SettlementPolicy, CoreError> {
        let rate = CommissionRate::from_percent(self.commission_percent)?;
        SettlementPolicy::new(self.credit_unit_price, rate, self.timezone()?)
            .map_err(|e| CoreError::configuration(e.to_string()))
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }
}
