//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Startup connection attempts before giving up
pub const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.timeout())
            .connect(&config.url())
            .await?;

        tracing::info!(
            host = %config.host,
            database = %config.name,
            "PostgreSQL connection pool established"
        );
        Ok(Self { pool })
    }

    /// Connect, retrying a few times while the database comes up
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let mut attempt = 1;
        loop {
            match Self::connect(config).await {
                Ok(db) => return Ok(db),
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    tracing::error!(attempt, error = %e, "Database connection failed, retrying");
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "Database connection failed, aborting");
                    return Err(e);
                }
            }
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the charge table and its listing index if absent
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balance_charge (
                id            BIGSERIAL PRIMARY KEY,
                fk_balance_id BIGINT       NOT NULL,
                type_charge   VARCHAR(16)  NOT NULL,
                charged_at    TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
                currency      VARCHAR(8)   NOT NULL,
                amount        NUMERIC(20, 8) NOT NULL,
                tenant_id     VARCHAR(64)  NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_balance_charge_balance
                ON balance_charge (fk_balance_id, charged_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("balance_charge schema ready");
        Ok(())
    }
}
