//! Discovery of new and changed files
//!
//! A scan lists every syncable file of every configured site, asks the
//! destination which of them are new or changed since the last sync, and
//! enqueues exactly those.

use crate::auth::TokenProvider;
use crate::clients::{DestinationClient, FileDiffItem, SourceClient, SyncItem};
use crate::error::ScanError;
use crate::metrics::{DiffCounts, MetricsSink};
use crate::queue::JobQueue;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Site label used for scan-wide errors
const GLOBAL_SITE: &str = "global";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub sites_scanned: usize,
    pub sites_failed: usize,
    pub discovered: u64,
    pub diff: DiffCounts,
    pub queued: u64,
    /// Items listed more than once across sites, dropped before the diff
    pub duplicates: u64,
    /// Items skipped because a job for the file was already pending
    pub already_pending: u64,
    pub enqueue_failures: u64,
}

/// One discovery pass, the unit of work the scheduler runs under its lock
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn scan_for_work(&self) -> Result<ScanSummary, ScanError>;
}

pub struct SharePointScanner {
    sites: Vec<String>,
    source: Arc<dyn SourceClient>,
    destination: Arc<dyn DestinationClient>,
    tokens: Arc<dyn TokenProvider>,
    queue: Arc<dyn JobQueue>,
    metrics: Arc<dyn MetricsSink>,
}

impl SharePointScanner {
    pub fn new(
        sites: Vec<String>,
        source: Arc<dyn SourceClient>,
        destination: Arc<dyn DestinationClient>,
        tokens: Arc<dyn TokenProvider>,
        queue: Arc<dyn JobQueue>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            sites,
            source,
            destination,
            tokens,
            queue,
            metrics,
        }
    }

    async fn discover(&self, summary: &mut ScanSummary) -> Vec<SyncItem> {
        let mut discovered = Vec::new();
        let mut seen = HashSet::new();

        for site in &self.sites {
            match self.source.list_syncable_items(site).await {
                Ok(items) => {
                    info!(site = %site, count = items.len(), "Discovered syncable files");
                    self.metrics.files_discovered(site, items.len() as u64);
                    summary.sites_scanned += 1;
                    for item in items {
                        let sync = SyncItem {
                            site_id: site.clone(),
                            item,
                        };
                        if seen.insert(sync.diff_key()) {
                            discovered.push(sync);
                        } else {
                            debug!(site = %site, file_id = %sync.item.id, "Skipping duplicate file");
                            summary.duplicates += 1;
                        }
                    }
                },
                Err(e) => {
                    error!(site = %site, error = %e, "Failed to scan site");
                    self.metrics.scan_error(site, "site_scan_failed");
                    summary.sites_failed += 1;
                },
            }
        }

        discovered
    }

    async fn run_scan(&self) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary::default();
        let discovered = self.discover(&mut summary).await;
        if summary.sites_scanned == 0 && summary.sites_failed > 0 {
            return Err(ScanError::AllSitesFailed {
                failed: summary.sites_failed,
            });
        }
        summary.discovered = discovered.len() as u64;

        if discovered.is_empty() {
            info!("No syncable files found");
            return Ok(summary);
        }

        let token = self.tokens.destination_token().await?;
        let files: Vec<FileDiffItem> = discovered.iter().map(FileDiffItem::from).collect();
        let diff = self.destination.diff_files(files, &token).await?;

        summary.diff = DiffCounts {
            new_and_updated: diff.new_and_updated_files.len() as u64,
            unchanged: summary
                .discovered
                .saturating_sub(diff.new_and_updated_files.len() as u64),
            deleted: diff.deleted_files.len() as u64,
            moved: diff.moved_files.len() as u64,
        };
        self.metrics.file_diff_results(summary.diff);

        let wanted: HashSet<&str> = diff.new_and_updated_files.iter().map(String::as_str).collect();
        for item in discovered {
            if !wanted.contains(item.diff_key().as_str()) {
                continue;
            }

            let file_id = item.item.id.clone();
            match self.queue.enqueue(item).await {
                Ok(Some(job_id)) => {
                    debug!(job_id = %job_id, file_id = %file_id, "File queued");
                    summary.queued += 1;
                },
                Ok(None) => {
                    debug!(file_id = %file_id, "File already queued");
                    summary.already_pending += 1;
                },
                Err(e) => {
                    warn!(file_id = %file_id, error = %e, "Failed to queue file");
                    summary.enqueue_failures += 1;
                },
            }
        }
        self.metrics.files_queued(summary.queued);

        match self.queue.depth().await {
            Ok(depth) => self.metrics.queue_size(depth),
            Err(e) => warn!(error = %e, "Failed to read queue depth"),
        }

        Ok(summary)
    }
}

#[async_trait]
impl ScanRunner for SharePointScanner {
    async fn scan_for_work(&self) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        self.metrics.scan_started();
        info!(sites = self.sites.len(), "Scan started");

        match self.run_scan().await {
            Ok(summary) => {
                let elapsed = started.elapsed();
                self.metrics.scan_completed(elapsed);
                info!(
                    discovered = summary.discovered,
                    new_and_updated = summary.diff.new_and_updated,
                    queued = summary.queued,
                    sites_failed = summary.sites_failed,
                    duration_ms = elapsed.as_millis() as u64,
                    "Scan completed"
                );
                Ok(summary)
            },
            Err(e) => {
                self.metrics.scan_error(GLOBAL_SITE, "scan_failed");
                Err(e)
            },
        }
    }
}
