//! Periodic scan scheduling
//!
//! Every tick tries to take the scan lock. The instance that gets it runs a
//! scan while a background task keeps extending the lease; every other
//! instance skips the tick. The lock is released with its ownership value
//! once the scan ends, so a lease taken over by someone else after a missed
//! renewal is never deleted.

use crate::health::HealthFlag;
use crate::lock::{DistributedLock, LockLease};
use crate::scanner::ScanRunner;
use spc_common::CorrelationId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another instance holds the lock
    LockDenied,
    Scanned,
    ScanFailed,
    /// Shutdown fired while the scan was running
    Interrupted,
}

pub struct ScanScheduler {
    lock: DistributedLock,
    scanner: Arc<dyn ScanRunner>,
    health: HealthFlag,
    lock_key: String,
    interval: Duration,
}

impl ScanScheduler {
    /// The lease TTL equals `interval`
    pub fn new(
        lock: DistributedLock,
        scanner: Arc<dyn ScanRunner>,
        health: HealthFlag,
        lock_key: String,
        interval: Duration,
    ) -> Self {
        Self {
            lock,
            scanner,
            health,
            lock_key,
            interval,
        }
    }

    fn renewal_period(&self) -> Duration {
        (self.interval * 2 / 3).max(Duration::from_secs(1))
    }

    /// Tick immediately, then every interval, until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            lock_key = %self.lock_key,
            "Scan scheduler started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.run_tick(&shutdown).await == TickOutcome::Interrupted {
                        break;
                    }
                },
            }
        }

        info!("Scan scheduler stopped");
    }

    /// One pass of the schedule: lock, scan, release
    pub async fn run_tick(&self, shutdown: &CancellationToken) -> TickOutcome {
        let correlation_id = CorrelationId::new();
        let span = info_span!("scan", correlation_id = %correlation_id);
        self.tick_inner(shutdown).instrument(span).await
    }

    async fn tick_inner(&self, shutdown: &CancellationToken) -> TickOutcome {
        let Some(lease) = self.lock.acquire(&self.lock_key, self.interval, None).await else {
            info!("Scan skipped, another instance holds the scan lock");
            return TickOutcome::LockDenied;
        };

        info!("Scan lock acquired, starting scan");
        let renewal = self.start_renewal(&lease);

        let outcome = tokio::select! {
            result = self.scanner.scan_for_work() => match result {
                Ok(_) => {
                    self.health.set(true);
                    TickOutcome::Scanned
                },
                Err(e) => {
                    error!(error = %e, "Scan failed");
                    self.health.set(false);
                    TickOutcome::ScanFailed
                },
            },
            _ = shutdown.cancelled() => {
                warn!("Shutdown during scan, releasing scan lock");
                TickOutcome::Interrupted
            },
        };

        renewal.abort();
        if !self.lock.release(&lease.key, Some(lease.value.as_str())).await {
            warn!("Scan lock was no longer held at release");
        }
        outcome
    }

    /// Keep extending the lease until aborted
    fn start_renewal(&self, lease: &LockLease) -> JoinHandle<()> {
        let lock = self.lock.clone();
        let key = lease.key.clone();
        let value = lease.value.clone();
        let ttl = self.interval;
        let period = self.renewal_period();

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            timer.tick().await;

            loop {
                timer.tick().await;
                if lock.extend(&key, ttl, Some(value.as_str())).await {
                    info!(lock_key = %key, "Scan lock extended");
                } else {
                    warn!(lock_key = %key, "Failed to extend scan lock");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::{AuthError, ScanError};
    use crate::lock::{LockBackend, MemoryLockBackend};
    use crate::metrics::NoopMetrics;
    use crate::queue::{MemoryJobQueue, RetryPolicy};
    use crate::scanner::{ScanSummary, SharePointScanner};
    use crate::test_support::{CountingBackend, FakeDestination, FakeSource, StaticTokens};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "spc:scan-lock";

    #[derive(Default)]
    struct CountingScanner {
        calls: AtomicUsize,
        fail: bool,
        duration: Duration,
    }

    #[async_trait]
    impl ScanRunner for CountingScanner {
        async fn scan_for_work(&self) -> Result<ScanSummary, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
            if self.fail {
                return Err(AuthError::MissingToken { provider: "Zitadel" }.into());
            }
            Ok(ScanSummary::default())
        }
    }

    fn scheduler(
        backend: Arc<CountingBackend>,
        scanner: Arc<CountingScanner>,
    ) -> (ScanScheduler, HealthFlag) {
        let health = HealthFlag::new(Arc::new(NoopMetrics));
        let scheduler = ScanScheduler::new(
            DistributedLock::new(backend),
            scanner,
            health.clone(),
            KEY.to_string(),
            Duration::from_secs(900),
        );
        (scheduler, health)
    }

    #[tokio::test]
    async fn test_denied_lock_skips_scan_and_release() {
        let inner = Arc::new(MemoryLockBackend::new());
        inner
            .try_acquire(KEY, "other-instance", Duration::from_secs(900))
            .await
            .unwrap();
        let backend = Arc::new(CountingBackend::new(inner.clone()));
        let scanner = Arc::new(CountingScanner::default());
        let (scheduler, _) = scheduler(backend.clone(), scanner.clone());

        let outcome = scheduler.run_tick(&CancellationToken::new()).await;

        assert_eq!(outcome, TickOutcome::LockDenied);
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 0);
        assert_eq!(inner.holder(KEY).as_deref(), Some("other-instance"));
    }

    #[tokio::test]
    async fn test_acquired_lock_scans_then_releases_own_lease() {
        let inner = Arc::new(MemoryLockBackend::new());
        let backend = Arc::new(CountingBackend::new(inner.clone()));
        let scanner = Arc::new(CountingScanner::default());
        let (scheduler, health) = scheduler(backend.clone(), scanner.clone());

        let outcome = scheduler.run_tick(&CancellationToken::new()).await;

        assert_eq!(outcome, TickOutcome::Scanned);
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
        assert!(backend.last_release_value().is_some());
        assert!(inner.holder(KEY).is_none());
        assert!(health.is_healthy());
    }

    #[tokio::test]
    async fn test_scan_failure_is_contained_and_lock_released() {
        let inner = Arc::new(MemoryLockBackend::new());
        let backend = Arc::new(CountingBackend::new(inner.clone()));
        let scanner = Arc::new(CountingScanner {
            fail: true,
            ..Default::default()
        });
        let (scheduler, health) = scheduler(backend.clone(), scanner);

        let outcome = scheduler.run_tick(&CancellationToken::new()).await;

        assert_eq!(outcome, TickOutcome::ScanFailed);
        assert!(inner.holder(KEY).is_none());
        assert!(!health.is_healthy());
    }

    #[tokio::test]
    async fn test_scan_reaching_no_site_marks_unhealthy() {
        let source = FakeSource {
            failing_sites: vec!["site-a".to_string(), "site-b".to_string()],
            ..Default::default()
        };
        let queue = MemoryJobQueue::new(
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_secs(1),
            },
            Duration::from_secs(300),
            10,
        );
        let scanner = Arc::new(SharePointScanner::new(
            vec!["site-a".to_string(), "site-b".to_string()],
            Arc::new(source),
            Arc::new(FakeDestination::default()),
            Arc::new(StaticTokens::default()),
            Arc::new(queue),
            Arc::new(NoopMetrics),
        ));
        let inner = Arc::new(MemoryLockBackend::new());
        let health = HealthFlag::new(Arc::new(NoopMetrics));
        let scheduler = ScanScheduler::new(
            DistributedLock::new(inner.clone()),
            scanner,
            health.clone(),
            KEY.to_string(),
            Duration::from_secs(900),
        );
        assert!(health.is_healthy());

        let outcome = scheduler.run_tick(&CancellationToken::new()).await;

        assert_eq!(outcome, TickOutcome::ScanFailed);
        assert!(!health.is_healthy());
        assert!(inner.holder(KEY).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_scan_renews_lease() {
        let inner = Arc::new(MemoryLockBackend::new());
        let backend = Arc::new(CountingBackend::new(inner.clone()));
        let scanner = Arc::new(CountingScanner {
            duration: Duration::from_secs(1300),
            ..Default::default()
        });
        let (scheduler, _) = scheduler(backend.clone(), scanner);

        let outcome = scheduler.run_tick(&CancellationToken::new()).await;

        assert_eq!(outcome, TickOutcome::Scanned);
        // Renewals at 600s and 1200s of a 1300s scan
        assert_eq!(backend.extends.load(Ordering::SeqCst), 2);
        assert!(inner.holder(KEY).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_scan_releases_lock() {
        let inner = Arc::new(MemoryLockBackend::new());
        let backend = Arc::new(CountingBackend::new(inner.clone()));
        let scanner = Arc::new(CountingScanner {
            duration: Duration::from_secs(3600),
            ..Default::default()
        });
        let (scheduler, _) = scheduler(backend.clone(), scanner);
        let shutdown = CancellationToken::new();

        let canceller = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                shutdown.cancel();
            })
        };
        scheduler.run(shutdown).await;
        canceller.await.unwrap();

        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
        assert!(inner.holder(KEY).is_none());
    }
}
