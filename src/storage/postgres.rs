use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::DatabaseConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    #[error("Duplicate value violates unique constraint {0}")]
    UniqueViolation(String),
    #[error("Record is still referenced by {0}")]
    ForeignKeyViolation(String),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                return StorageError::UniqueViolation(constraint);
            }
            if db.is_foreign_key_violation() {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                return StorageError::ForeignKeyViolation(constraint);
            }
        }
        StorageError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Query performance metrics
#[derive(Debug, Clone, Default)]
pub struct QueryMetrics {
    pub total_queries: Arc<AtomicU64>,
    pub slow_queries: Arc<AtomicU64>,
    pub total_query_time_ms: Arc<AtomicU64>,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, duration_ms: u64) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_ms
            .fetch_add(duration_ms, Ordering::Relaxed);

        // Queries over 100ms are considered slow
        if duration_ms > 100 {
            self.slow_queries.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow query detected: {}ms", duration_ms);
        }
    }

    pub fn get_stats(&self) -> (u64, u64, u64) {
        (
            self.total_queries.load(Ordering::Relaxed),
            self.slow_queries.load(Ordering::Relaxed),
            self.total_query_time_ms.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub server_version: String,
    pub database_size: String,
    pub table_count: i64,
    pub response_time_ms: u64,
    pub pool_size: u32,
    pub idle_connections: usize,
}

/// PostgreSQL storage. Repository methods for each business area live in sibling modules
/// as further `impl PgStorage` blocks.
#[derive(Clone)]
pub struct PgStorage {
    pub(crate) pool: PgPool,
    metrics: QueryMetrics,
}

impl PgStorage {
    /// Connect using the configured host/port/credentials.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .max_lifetime(Some(std::time::Duration::from_secs(1800)))
            .connect_with(options)
            .await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            "PostgreSQL pool ready"
        );

        Ok(Self {
            pool,
            metrics: QueryMetrics::new(),
        })
    }

    /// Connect from a full connection URL.
    pub async fn connect_url(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            metrics: QueryMetrics::new(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn metrics(&self) -> &QueryMetrics {
        &self.metrics
    }

    /// Await a query future, recording its latency.
    pub(crate) async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.metrics.record_query(start.elapsed().as_millis() as u64);
        Ok(result?)
    }

    /// Begin a transaction for multi-statement atomicity.
    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("PostgreSQL migrations completed");
        Ok(())
    }

    /// Connectivity check (`SELECT 1`).
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Detailed health: version, size, table count, pool occupancy.
    pub async fn database_health(&self) -> Result<DatabaseHealth> {
        let start = Instant::now();
        let row = sqlx::query(
            r#"
            SELECT
                current_setting('server_version') AS server_version,
                pg_size_pretty(pg_database_size(current_database())) AS database_size,
                (SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public') AS table_count
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let response_time_ms = start.elapsed().as_millis() as u64;

        Ok(DatabaseHealth {
            server_version: row.get("server_version"),
            database_size: row.get("database_size"),
            table_count: row.get("table_count"),
            response_time_ms,
            pool_size: self.pool.size(),
            idle_connections: self.pool.num_idle(),
        })
    }
}

/// Pool pointed at a closed port. Every query fails fast; used to exercise
/// error paths without a database.
#[cfg(test)]
pub(crate) fn unreachable_storage() -> PgStorage {
    let options = PgConnectOptions::new().host("127.0.0.1").port(1);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy_with(options);
    PgStorage {
        pool,
        metrics: QueryMetrics::new(),
    }
}

/// Connect to the database named by `OOAK_TEST_DATABASE_URL` and migrate it.
/// Returns `None` when the variable is unset so database tests are skipped.
#[cfg(test)]
pub(crate) async fn test_storage() -> Option<PgStorage> {
    let url = std::env::var("OOAK_TEST_DATABASE_URL").ok()?;
    let storage = PgStorage::connect_url(&url, 4).await.ok()?;
    storage.migrate().await.ok()?;
    Some(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    #[test]
    fn test_query_metrics_counts_slow_queries() {
        let metrics = QueryMetrics::new();
        metrics.record_query(5);
        metrics.record_query(150);
        metrics.record_query(20);

        let (total, slow, time) = metrics.get_stats();
        assert_eq!(total, 3);
        assert_eq!(slow, 1);
        assert_eq!(time, 175);
    }

    #[test]
    fn test_query_metrics_shared_between_clones() {
        let metrics = QueryMetrics::new();
        let clone = metrics.clone();
        clone.record_query(1);
        assert_eq!(metrics.get_stats().0, 1);
    }

    // -------------------------------------------------------------------------
    // Connectivity (requires OOAK_TEST_DATABASE_URL)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_health_check() {
        let Some(storage) = test_storage().await else {
            return;
        };
        assert!(storage.health_check().await.is_ok());
        let health = storage.database_health().await.unwrap();
        assert!(health.table_count > 0);
    }

    #[tokio::test]
    async fn test_migration_idempotent() {
        let Some(storage) = test_storage().await else {
            return;
        };
        assert!(storage.migrate().await.is_ok());
    }
}
