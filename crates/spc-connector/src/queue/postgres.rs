//! Postgres queue on the `connector_jobs` table
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so any number of workers across
//! processes can poll the same table without handing out a job twice.

use super::{FailOutcome, Job, JobQueue, RetryPolicy};
use crate::clients::SyncItem;
use crate::error::QueueError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

const STATE_FAILED: &str = "failed";

pub struct PgJobQueue {
    pool: PgPool,
    policy: RetryPolicy,
    visibility_timeout: Duration,
    failed_retention: i64,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, policy: RetryPolicy, visibility_timeout: Duration, failed_retention: u64) -> Self {
        Self {
            pool,
            policy,
            visibility_timeout,
            failed_retention: i64::try_from(failed_retention).unwrap_or(i64::MAX),
        }
    }

    /// Failed rows beyond the retention limit are deleted, newest kept
    async fn prune_failed(&self) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            DELETE FROM connector_jobs
             WHERE id IN (
                SELECT id FROM connector_jobs
                 WHERE state = 'failed'
                 ORDER BY updated_at DESC
                OFFSET $1
             )
            "#,
        )
        .bind(self.failed_retention)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Move a claimed job with an unreadable payload straight to failed
    async fn bury(&self, id: Uuid, reason: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE connector_jobs
               SET state = 'failed', last_error = $2, claimed_by = NULL,
                   claimed_at = NULL, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, item: SyncItem) -> Result<Option<Uuid>, QueueError> {
        let dedupe_key = item.diff_key();
        let payload = serde_json::to_value(&item)?;

        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO connector_jobs (id, dedupe_key, payload, max_attempts)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (dedupe_key) WHERE state IN ('ready', 'active') DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&dedupe_key)
        .bind(payload)
        .bind(i32::try_from(self.policy.max_attempts).unwrap_or(i32::MAX))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let row: Option<(Uuid, Value, i32, i32)> = sqlx::query_as(
            r#"
            UPDATE connector_jobs
               SET state = 'active', attempts = attempts + 1, claimed_by = $1,
                   claimed_at = now(), updated_at = now()
             WHERE id = (
                SELECT id FROM connector_jobs
                 WHERE state = 'ready' AND available_at <= now()
                 ORDER BY available_at, created_at
                 LIMIT 1
                   FOR UPDATE SKIP LOCKED
             )
            RETURNING id, payload, attempts, max_attempts
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, payload, attempts, max_attempts)) = row else {
            return Ok(None);
        };

        match serde_json::from_value::<SyncItem>(payload) {
            Ok(item) => Ok(Some(Job {
                id,
                item,
                attempts: to_u32(attempts),
                max_attempts: to_u32(max_attempts),
            })),
            Err(e) => {
                error!(job_id = %id, error = %e, "Unreadable job payload");
                self.bury(id, &format!("Unreadable payload: {e}")).await?;
                Err(e.into())
            },
        }
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM connector_jobs WHERE id = $1 AND state = 'active'")
            .bind(job.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job.id));
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError> {
        let delay = self.policy.delay_for(job.attempts);

        let row: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE connector_jobs
               SET state = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'ready' END,
                   available_at = CASE WHEN attempts >= max_attempts THEN available_at
                                       ELSE now() + make_interval(secs => $2) END,
                   last_error = $3, claimed_by = NULL, claimed_at = NULL, updated_at = now()
             WHERE id = $1 AND state = 'active'
            RETURNING state
            "#,
        )
        .bind(job.id)
        .bind(delay.as_secs_f64())
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        let Some((state,)) = row else {
            return Err(QueueError::NotFound(job.id));
        };

        if state == STATE_FAILED {
            let pruned = self.prune_failed().await?;
            if pruned > 0 {
                warn!(pruned, "Pruned failed jobs beyond retention");
            }
            return Ok(FailOutcome::Dead);
        }
        Ok(FailOutcome::Retrying { delay })
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM connector_jobs WHERE state = 'ready'")
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE connector_jobs
               SET state = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'ready' END,
                   available_at = now(),
                   last_error = 'Visibility timeout expired',
                   claimed_by = NULL, claimed_at = NULL, updated_at = now()
             WHERE state = 'active'
               AND claimed_at <= now() - make_interval(secs => $1)
            "#,
        )
        .bind(self.visibility_timeout.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
