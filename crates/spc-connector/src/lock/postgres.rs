//! Postgres lock store on the `distributed_locks` table
//!
//! Each primitive is a single statement, so the row lock Postgres takes for
//! the statement is what makes compare-and-set and compare-and-delete atomic.

use super::backend::LockBackend;
use crate::error::LockError;
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

pub struct PgLockBackend {
    pool: PgPool,
}

impl PgLockBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockBackend for PgLockBackend {
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        // An expired row is taken over in place; a live one makes the upsert a no-op
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO distributed_locks (lock_key, lock_value, expires_at, acquired_at)
            VALUES ($1, $2, now() + make_interval(secs => $3), now())
            ON CONFLICT (lock_key) DO UPDATE
               SET lock_value = EXCLUDED.lock_value,
                   expires_at = EXCLUDED.expires_at,
                   acquired_at = EXCLUDED.acquired_at
             WHERE distributed_locks.expires_at <= now()
            RETURNING lock_key
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn extend(&self, key: &str, value: Option<&str>, ttl: Duration) -> Result<bool, LockError> {
        let result = sqlx::query(
            r#"
            UPDATE distributed_locks
               SET expires_at = now() + make_interval(secs => $2)
             WHERE lock_key = $1
               AND expires_at > now()
               AND ($3::text IS NULL OR lock_value = $3)
            "#,
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &str, value: Option<&str>) -> Result<bool, LockError> {
        let result = sqlx::query(
            r#"
            DELETE FROM distributed_locks
             WHERE lock_key = $1
               AND ($2::text IS NULL OR lock_value = $2)
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
