//! Durable work queue feeding the pipeline
//!
//! The scanner enqueues one [`SyncItem`] per new or changed file. Workers
//! claim jobs, run the pipeline and report the outcome. A failed job is
//! retried with exponential backoff until its attempts are used up, then
//! moved to the failed state where it stays (bounded) for inspection.

mod memory;
mod postgres;
mod worker;

pub use memory::{FailedJob, MemoryJobQueue};
pub use postgres::PgJobQueue;
pub use worker::QueueWorker;

use crate::clients::SyncItem;
use crate::config::ProcessingConfig;
use crate::error::QueueError;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Backoff exponent cap, keeps the delay computation from overflowing
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// A claimed unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub item: SyncItem,
    /// Attempts made so far, including the current one
    pub attempts: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_backoff: config.retry_backoff(),
        }
    }

    /// Wait before the attempt following failed attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_backoff.saturating_mul(1 << exponent)
    }
}

/// What happened to a job after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { delay: Duration },
    /// Attempts exhausted, the job is in the failed state
    Dead,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a job for `item`.
    ///
    /// Returns `None` when a job for the same file is already pending.
    async fn enqueue(&self, item: SyncItem) -> Result<Option<Uuid>, QueueError>;

    /// Take the oldest job that is due, if any
    async fn claim(&self, worker_id: &str) -> Result<Option<Job>, QueueError>;

    /// Remove a successfully processed job
    async fn complete(&self, job: &Job) -> Result<(), QueueError>;

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError>;

    /// Jobs waiting to be claimed, including those in backoff
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Return jobs claimed longer ago than the visibility timeout to the queue.
    ///
    /// Covers workers that died mid-job.
    async fn reclaim_expired(&self) -> Result<u64, QueueError>;
}
