//! `kv_entries` table used as a shared TTL store across service instances.
//!
//! Expired rows are ignored on read and removed lazily by `purge_expired`.

use super::KeyValueStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{Instrument, info_span};

#[derive(Clone, Debug)]
pub struct PgKeyValueStore {
    pool: PgPool,
}

impl PgKeyValueStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let query = "SELECT value FROM kv_entries WHERE key = $1 AND expires_at > NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to read kv entry")?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let query = r"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 millisecond'))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(ttl_ms)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to write kv entry")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let query = "DELETE FROM kv_entries WHERE key = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete kv entry")?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let query = "DELETE FROM kv_entries WHERE expires_at <= NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired kv entries")?;
        Ok(result.rows_affected())
    }
}
