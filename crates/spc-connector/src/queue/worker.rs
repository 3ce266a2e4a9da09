//! Queue worker
//!
//! Claims jobs up to a concurrency bound and runs each through the pipeline
//! executor. Failed runs go back to the queue for retry; the queue decides
//! when a job is dead.

use super::{FailOutcome, Job, JobQueue};
use crate::health::HealthFlag;
use crate::metrics::MetricsSink;
use crate::pipeline::{ErrorKind, PipelineExecutor, PipelineStep, Step};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct QueueWorker<S = PipelineStep> {
    worker_id: String,
    queue: Arc<dyn JobQueue>,
    executor: Arc<PipelineExecutor<S>>,
    metrics: Arc<dyn MetricsSink>,
    health: HealthFlag,
    concurrency: usize,
    poll_interval: Duration,
    reclaim_interval: Duration,
}

impl<S: Step + 'static> QueueWorker<S> {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        executor: Arc<PipelineExecutor<S>>,
        metrics: Arc<dyn MetricsSink>,
        health: HealthFlag,
        concurrency: usize,
        poll_interval: Duration,
        reclaim_interval: Duration,
    ) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            worker_id: format!("{}-{}", hostname, Uuid::new_v4()),
            queue,
            executor,
            metrics,
            health,
            concurrency: concurrency.max(1),
            poll_interval,
            reclaim_interval,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Process jobs until `shutdown` fires, then wait for in-flight jobs
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            worker_id = %self.worker_id,
            concurrency = self.concurrency,
            "Queue worker started"
        );

        let reclaimer = self.start_reclaim_task();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Job task panicked");
                }
            }

            match self.queue.claim(&self.worker_id).await {
                Ok(Some(job)) => {
                    let worker = self.clone();
                    tasks.spawn(async move {
                        worker.handle(job).await;
                        drop(permit);
                    });
                },
                Ok(None) => {
                    drop(permit);
                    if idle(&shutdown, self.poll_interval).await {
                        break;
                    }
                },
                Err(e) => {
                    error!(error = %e, "Failed to claim job");
                    drop(permit);
                    if idle(&shutdown, self.poll_interval).await {
                        break;
                    }
                },
            }
        }

        info!(in_flight = tasks.len(), "Queue worker draining");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task panicked");
            }
        }
        reclaimer.abort();
        info!(worker_id = %self.worker_id, "Queue worker stopped");
    }

    fn start_reclaim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let metrics = self.metrics.clone();
        let period = self.reclaim_interval;

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;

                match queue.reclaim_expired().await {
                    Ok(0) => {},
                    Ok(reclaimed) => warn!(reclaimed, "Reclaimed jobs past their visibility timeout"),
                    Err(e) => error!(error = %e, "Failed to reclaim expired jobs"),
                }
                if let Ok(depth) = queue.depth().await {
                    metrics.queue_size(depth);
                }
            }
        })
    }

    /// Run one job and report its outcome to the queue
    pub async fn handle(&self, job: Job) {
        let span = info_span!("job", job_id = %job.id, attempt = job.attempts);
        self.handle_inner(job).instrument(span).await
    }

    async fn handle_inner(&self, job: Job) {
        let started = Instant::now();
        debug!(job_id = %job.id, file_id = %job.item.item.id, "Job started");

        let result = self.executor.process_item(&job.item).await;

        if result.success {
            if let Err(e) = self.queue.complete(&job).await {
                error!(job_id = %job.id, error = %e, "Failed to mark job complete");
            }
            self.metrics.job_completed(None, started.elapsed());
            self.health.set(true);
            info!(
                job_id = %job.id,
                correlation_id = %result.context.correlation_id,
                "Job completed"
            );
            return;
        }

        let (kind, message) = match &result.error {
            Some(e) => (e.kind(), e.to_string()),
            None => (ErrorKind::Transient, "Pipeline failed".to_string()),
        };
        self.metrics.job_completed(Some(kind), started.elapsed());

        let recorded = format!("[{kind}] {message}");
        match self.queue.fail(&job, &recorded).await {
            Ok(FailOutcome::Retrying { delay }) => warn!(
                job_id = %job.id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error_kind = %kind,
                error = %message,
                "Job failed, will retry"
            ),
            Ok(FailOutcome::Dead) => {
                error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    error_kind = %kind,
                    error = %message,
                    "Job failed permanently"
                );
                self.health.set(false);
            },
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to record job failure"),
        }
    }
}

/// Wait one poll interval; true when shutdown fired meanwhile
async fn idle(shutdown: &CancellationToken, poll_interval: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = sleep(poll_interval) => false,
    }
}
