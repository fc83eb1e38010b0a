//! SQLite adapters for the entity graph cache.

pub mod connection;
pub mod query_executor;

pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use query_executor::SqliteQueryExecutor;

use crate::domain::models::DatabaseConfig;

/// Open a verified pool for the configured source database.
pub async fn connect(config: &DatabaseConfig) -> Result<SqliteQueryExecutor, ConnectionError> {
    let pool = create_pool(&config.url, Some(PoolConfig::from(config))).await?;
    verify_connection(&pool).await?;
    Ok(SqliteQueryExecutor::new(pool))
}
