//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::Config;

/// Type alias for the database pool.
pub type Pool = PgPool;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect the document store's pool.
pub async fn create_pool(config: &Config) -> Result<Pool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        "Connected to document database"
    );
    Ok(pool)
}

/// Apply pending schema migrations for the documents table.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
