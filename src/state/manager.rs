//! PostgreSQL recovery store

use super::{normalize_address, PendingIntent, RecoveryStore};
use crate::config::DatabaseConfig;
use crate::error::{FundingError, FundingResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

/// Recovery store persisted in PostgreSQL
pub struct PgRecoveryStore {
    pool: PgPool,
}

impl PgRecoveryStore {
    /// Connect to the configured database
    pub async fn new(config: &DatabaseConfig) -> FundingResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await
            .map_err(FundingError::Database)?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> FundingResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_intents (
                requester VARCHAR(130) NOT NULL,
                intent_id BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (requester, intent_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> FundingResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(FundingError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl RecoveryStore for PgRecoveryStore {
    async fn pending_count(&self) -> FundingResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS pending FROM pending_intents")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("pending") as u64)
    }

    async fn put(&self, address: &str, intent_id: u64) -> FundingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_intents (requester, intent_id)
            VALUES ($1, $2)
            ON CONFLICT (requester, intent_id) DO NOTHING
            "#,
        )
        .bind(normalize_address(address))
        .bind(intent_id as i64)
        .execute(&self.pool)
        .await?;

        debug!("Recorded pending intent {} for {}", intent_id, address);
        Ok(())
    }

    async fn remove(&self, address: &str, intent_id: u64) -> FundingResult<()> {
        sqlx::query("DELETE FROM pending_intents WHERE requester = $1 AND intent_id = $2")
            .bind(normalize_address(address))
            .bind(intent_id as i64)
            .execute(&self.pool)
            .await?;

        debug!("Cleared pending intent {} for {}", intent_id, address);
        Ok(())
    }

    async fn list_entries(&self, address: &str) -> FundingResult<Vec<PendingIntent>> {
        let rows = sqlx::query(
            r#"
            SELECT intent_id, created_at
            FROM pending_intents
            WHERE requester = $1
            ORDER BY intent_id
            "#,
        )
        .bind(normalize_address(address))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PendingIntent {
                intent_id: row.get::<i64, _>("intent_id") as u64,
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }
}
