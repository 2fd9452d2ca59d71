use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::Instrument;

use super::{ttl_seconds, CodeStore, StoreError};

/// Codes shared between instances through the `ephemeral_codes` table.
///
/// Expiry is evaluated by the database clock so every instance agrees on it.
#[derive(Clone, Debug)]
pub struct PgCodeStore {
    pool: PgPool,
}

impl PgCodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO ephemeral_codes (key, value, expires_at)
            VALUES ($1, $2, now() + $3::bigint * interval '1 second')
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
        ";
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(ttl_seconds(ttl))
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let query = "SELECT value FROM ephemeral_codes WHERE key = $1 AND expires_at > now()";
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;

        row.map(|row| row.try_get::<String, _>("value"))
            .transpose()
            .map_err(Into::into)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        // one statement, so concurrent redeemers serialize on the row lock
        let query = r"
            DELETE FROM ephemeral_codes
            WHERE key = $1
            RETURNING value, expires_at > now() AS live
        ";
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let live: bool = row.try_get("live")?;
        if live {
            Ok(Some(row.try_get("value")?))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM ephemeral_codes WHERE key = $1";
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let query = "DELETE FROM ephemeral_codes WHERE expires_at <= now()";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }
}
