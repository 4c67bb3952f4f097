//! PostgreSQL containers for integration tests
//!
//! Each [`TestDatabase`] owns a throwaway container migrated with the same
//! embedded migrations the application runs. Pools are bound to the runtime
//! that opened them, so every `#[tokio::test]` starts its own database.

use std::time::Duration;

use domain_settlement::SettlementPolicy;
use infra_db::{create_pool, DatabaseConfig, DatabasePool};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::harness::TestMarketplace;

const IMAGE: &str = "postgres";
const TAG: &str = "16-alpine";
const USER: &str = "ledger";
const PASSWORD: &str = "ledger";
const DATABASE: &str = "marketplace_test";
const READY: &str = "database system is ready to accept connections";

/// Tables in dependency order, children first
pub const MARKETPLACE_TABLES: [&str; 7] = [
    "settlement_transactions",
    "counselor_settlement",
    "bookings",
    "credit_usage_log",
    "credit_lots",
    "cash_transactions",
    "wallets",
];

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection URL for the test credentials on `host:port`
pub fn connection_url(host: &str, port: u16) -> String {
    format!("postgres://{USER}:{PASSWORD}@{host}:{port}/{DATABASE}")
}

/// A migrated PostgreSQL container
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pool: DatabasePool,
    url: String,
}

impl TestDatabase {
    /// Starts a container and applies every migration
    pub async fn new() -> Result<Self, BoxError> {
        let container = GenericImage::new(IMAGE, TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY))
            .with_env_var("POSTGRES_USER", USER)
            .with_env_var("POSTGRES_PASSWORD", PASSWORD)
            .with_env_var("POSTGRES_DB", DATABASE)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;
        let url = connection_url(&host, port);

        // the postgres image restarts once after init, so allow a slow first connect
        let pool = create_pool(
            DatabaseConfig::new(url.clone())
                .max_connections(10)
                .min_connections(1)
                .connect_timeout(Duration::from_secs(30)),
        )
        .await?;
        infra_db::run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            pool,
            url,
        })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The full marketplace over this database
    pub fn marketplace(&self, policy: SettlementPolicy) -> TestMarketplace {
        TestMarketplace::postgres(self.pool.clone(), policy)
    }

    /// Empties every marketplace table, keeping the schema
    pub async fn truncate(&self) -> Result<(), BoxError> {
        sqlx::query(&format!(
            "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
            MARKETPLACE_TABLES.join(", ")
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of rows in one marketplace table
    ///
    /// # Panics
    ///
    /// Panics if `table` is not a marketplace table or the query fails
    pub async fn row_count(&self, table: &str) -> i64 {
        assert!(MARKETPLACE_TABLES.contains(&table), "unknown table {table}");
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| panic!("Failed to count {table}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        assert_eq!(
            connection_url("db", 6543),
            "postgres://ledger:ledger@db:6543/marketplace_test"
        );
    }

    #[test]
    fn test_tables_list_children_before_parents() {
        let position = |name: &str| MARKETPLACE_TABLES.iter().position(|t| *t == name).unwrap();
        assert!(position("credit_usage_log") < position("credit_lots"));
        assert!(position("cash_transactions") < position("wallets"));
    }
}
