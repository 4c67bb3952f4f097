//! Applies pending schema migrations
//!
//! ```bash
//! MARKETPLACE_DATABASE_URL=postgres://localhost/marketplace cargo run --bin ledger-migrate
//! ```
//!
//! Reads the same `MARKETPLACE_*` variables as the services; the storage
//! setting is ignored since migrations always target PostgreSQL.

use anyhow::Context;
use app_runtime::{init_tracing, AppConfig};
use infra_db::{create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format)?;

    tracing::info!(url = %redact(&config.database_url), "Migrating database");

    let pool = create_pool(config.database_config())
        .await
        .context("failed to connect to the database")?;
    run_migrations(&pool).await.context("migration failed")?;
    pool.close().await;

    tracing::info!("Database is up to date");
    Ok(())
}

/// Drops the password from a connection URL before logging it
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let credentials = &url[scheme + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:***{}", &url[..scheme + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
