//! Service wiring
//!
//! [`Services`] holds one instance of each domain service over a single
//! storage backend. The settlement store shares the credit store so that a
//! settlement and its credit refunds commit together.

use std::sync::Arc;

use tracing::{info, warn};

use core_kernel::{AdapterHealth, HealthCheckResult, HealthCheckable};
use domain_credit::{CreditInventory, CreditPurchaseService, InMemoryCreditStore};
use domain_ledger::{InMemoryLedgerStore, LedgerService};
use domain_settlement::{
    BookingDirectory, InMemoryBookingDirectory, InMemorySettlementStore, SettlementEngine,
    SettlementPolicy,
};
use infra_db::{
    create_pool, run_migrations, DatabasePool, PgBookingDirectory, PgCreditStore, PgLedgerStore,
    PgSettlementStore,
};

use crate::config::{AppConfig, StorageBackend};
use crate::error::RuntimeError;

/// The financial core, wired onto one backend
pub struct Services {
    pub ledger: LedgerService,
    pub inventory: CreditInventory,
    pub purchases: CreditPurchaseService,
    pub engine: SettlementEngine,
    pub bookings: Arc<dyn BookingDirectory>,
    probes: Vec<Arc<dyn HealthCheckable>>,
}

impl Services {
    /// Builds the services described by `config`
    ///
    /// With the `postgres` backend this connects the pool and applies
    /// pending migrations first.
    pub async fn from_config(config: &AppConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let policy = config.settlement_policy()?;

        let services = match config.storage {
            StorageBackend::Memory => Self::in_memory(policy),
            StorageBackend::Postgres => {
                let pool = create_pool(config.database_config()).await?;
                run_migrations(&pool).await?;
                Self::postgres(pool, policy)
            }
        };

        info!(
            storage = ?config.storage,
            unit_price = policy.unit_price,
            commission = %policy.commission_rate,
            timezone = policy.timezone.name(),
            "Services ready"
        );
        Ok(services)
    }

    pub fn in_memory(policy: SettlementPolicy) -> Self {
        let ledger_store = Arc::new(InMemoryLedgerStore::new());
        let credit_store = InMemoryCreditStore::new();
        let settlement_store = Arc::new(InMemorySettlementStore::new(credit_store.clone()));
        let credit_store = Arc::new(credit_store);
        let bookings: Arc<dyn BookingDirectory> = Arc::new(InMemoryBookingDirectory::new());

        let ledger = LedgerService::new(ledger_store.clone());
        let inventory = CreditInventory::new(credit_store.clone());
        Self {
            purchases: CreditPurchaseService::new(ledger.clone(), inventory.clone()),
            engine: SettlementEngine::new(settlement_store.clone(), bookings.clone(), policy),
            ledger,
            inventory,
            bookings,
            probes: vec![
                ledger_store as Arc<dyn HealthCheckable>,
                credit_store as Arc<dyn HealthCheckable>,
                settlement_store as Arc<dyn HealthCheckable>,
            ],
        }
    }

    pub fn postgres(pool: DatabasePool, policy: SettlementPolicy) -> Self {
        let ledger_store = Arc::new(PgLedgerStore::new(pool.clone()));
        let credit_store = Arc::new(PgCreditStore::new(pool.clone()));
        let settlement_store = Arc::new(PgSettlementStore::new(pool.clone()));
        let directory = Arc::new(PgBookingDirectory::new(pool));
        let bookings: Arc<dyn BookingDirectory> = directory.clone();

        let ledger = LedgerService::new(ledger_store.clone());
        let inventory = CreditInventory::new(credit_store.clone());
        Self {
            purchases: CreditPurchaseService::new(ledger.clone(), inventory.clone()),
            engine: SettlementEngine::new(settlement_store.clone(), bookings.clone(), policy),
            ledger,
            inventory,
            bookings,
            probes: vec![
                ledger_store as Arc<dyn HealthCheckable>,
                credit_store as Arc<dyn HealthCheckable>,
                settlement_store as Arc<dyn HealthCheckable>,
                directory as Arc<dyn HealthCheckable>,
            ],
        }
    }

    /// Probes every adapter
    pub async fn health_check(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let result = probe.health_check().await;
            if result.status != AdapterHealth::Healthy {
                warn!(
                    adapter = %result.adapter_id,
                    status = ?result.status,
                    message = result.message.as_deref().unwrap_or(""),
                    "Adapter unhealthy"
                );
            }
            results.push(result);
        }
        results
    }

    pub async fn is_healthy(&self) -> bool {
        self.health_check()
            .await
            .iter()
            .all(|result| result.status == AdapterHealth::Healthy)
    }
}
