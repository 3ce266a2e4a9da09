//! In-memory fakes shared by the unit tests
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::auth::TokenProvider;
use crate::clients::{
    ByteStream, ContentRegistrationRequest, DestinationClient, DriveItem, FileDiffItem, FileDiffResponse,
    FileFacet, FinalizedIngestion, IngestionFinalizationRequest, ItemReference, ListItem, RegisteredContent,
    SourceClient, SyncItem,
};
use crate::error::{AuthError, DestinationError, LockError, SourceError};
use crate::lock::{LockBackend, MemoryLockBackend};
use crate::metrics::{DiffCounts, MetricsSink, NoopMetrics};
use crate::pipeline::steps::{
    ContentFetchingStep, ContentRegistrationStep, IngestionFinalizationStep, StorageUploadStep,
    TokenValidationStep,
};
use crate::pipeline::{ErrorKind, PipelineExecutor, PipelineStep, StepName};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A flagged PDF in drive `drive-1` of site `site-1`
pub fn sync_item(id: &str) -> SyncItem {
    let mut fields = Map::new();
    fields.insert("FinanceGPTKnowledge".to_string(), json!(true));

    SyncItem {
        site_id: "site-1".to_string(),
        item: DriveItem {
            id: id.to_string(),
            name: format!("{id}.pdf"),
            web_url: format!("https://contoso.sharepoint.com/sites/Finance/Shared%20Documents/{id}.pdf"),
            size: Some(1024),
            last_modified_date_time: Some("2026-09-30T08:00:00Z".to_string()),
            file: Some(FileFacet {
                mime_type: Some("application/pdf".to_string()),
            }),
            folder: None,
            parent_reference: Some(ItemReference {
                drive_id: Some("drive-1".to_string()),
                site_id: Some("site-1".to_string()),
                ..Default::default()
            }),
            list_item: Some(ListItem { fields }),
        },
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// Fixed tokens; `None` fails like an exchange that returned no token
pub struct StaticTokens {
    pub source: Option<String>,
    pub destination: Option<String>,
}

impl Default for StaticTokens {
    fn default() -> Self {
        Self {
            source: Some("graph-token".to_string()),
            destination: Some("unique-token".to_string()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn source_token(&self) -> Result<String, AuthError> {
        self.source.clone().ok_or(AuthError::MissingToken {
            provider: "Microsoft Graph",
        })
    }

    async fn destination_token(&self) -> Result<String, AuthError> {
        self.destination
            .clone()
            .ok_or(AuthError::MissingToken { provider: "Zitadel" })
    }
}

// ============================================================================
// Source
// ============================================================================

#[derive(Default)]
pub struct FakeSource {
    pub items: HashMap<String, Vec<DriveItem>>,
    pub failing_sites: Vec<String>,
    pub chunks: Vec<Bytes>,
    /// `(drive_id, item_id)` of every download
    pub downloads: Mutex<Vec<(String, String)>>,
    /// Chunks actually pulled from download streams
    pub chunks_served: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn with_content(content: &[u8]) -> Self {
        Self::with_chunks(vec![Bytes::copy_from_slice(content)])
    }

    pub fn with_chunks(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn list_syncable_items(&self, site_id: &str) -> Result<Vec<DriveItem>, SourceError> {
        if self.failing_sites.iter().any(|s| s == site_id) {
            return Err(SourceError::InvalidResponse(format!("site {site_id} unavailable")));
        }
        Ok(self.items.get(site_id).cloned().unwrap_or_default())
    }

    async fn download_content(&self, drive_id: &str, item_id: &str) -> Result<ByteStream, SourceError> {
        self.downloads
            .lock()
            .unwrap()
            .push((drive_id.to_string(), item_id.to_string()));

        let served = self.chunks_served.clone();
        let stream = futures::stream::iter(self.chunks.clone()).map(move |chunk| {
            served.fetch_add(1, Ordering::SeqCst);
            Ok(chunk)
        });
        Ok(stream.boxed())
    }
}

// ============================================================================
// Destination
// ============================================================================

#[derive(Default)]
pub struct FakeDestination {
    pub diff: Option<FileDiffResponse>,
    pub upload_failure: Option<(u16, String)>,
    pub registrations: Mutex<Vec<(ContentRegistrationRequest, String)>>,
    /// `(write_url, mime_type, body)`
    pub uploads: Mutex<Vec<(String, String, Bytes)>>,
    pub finalizations: Mutex<Vec<(IngestionFinalizationRequest, String)>>,
    pub diffs: Mutex<Vec<(Vec<FileDiffItem>, String)>>,
}

#[async_trait]
impl DestinationClient for FakeDestination {
    async fn register_content(
        &self,
        request: &ContentRegistrationRequest,
        token: &str,
    ) -> Result<RegisteredContent, DestinationError> {
        self.registrations
            .lock()
            .unwrap()
            .push((request.clone(), token.to_string()));

        let file_id = request.key.rsplit('_').next().unwrap_or_default();
        Ok(RegisteredContent {
            id: format!("cont_{file_id}"),
            key: request.key.clone(),
            byte_size: None,
            mime_type: Some(request.mime_type.clone()),
            owner_type: Some(request.owner_type.clone()),
            owner_id: Some(request.scope_id.clone()),
            write_url: Some(format!("https://blob.example/write/{file_id}")),
            read_url: Some(format!("https://blob.example/read/{file_id}")),
            created_at: None,
            internally_stored_at: None,
        })
    }

    async fn upload_content(&self, write_url: &str, mime_type: &str, body: Bytes) -> Result<(), DestinationError> {
        if let Some((status, reason)) = &self.upload_failure {
            return Err(DestinationError::Upload {
                status: *status,
                reason: reason.clone(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((write_url.to_string(), mime_type.to_string(), body));
        Ok(())
    }

    async fn finalize_ingestion(
        &self,
        request: &IngestionFinalizationRequest,
        token: &str,
    ) -> Result<FinalizedIngestion, DestinationError> {
        self.finalizations
            .lock()
            .unwrap()
            .push((request.clone(), token.to_string()));
        Ok(FinalizedIngestion {
            id: request.content_id.clone(),
        })
    }

    async fn diff_files(&self, files: Vec<FileDiffItem>, token: &str) -> Result<FileDiffResponse, DestinationError> {
        self.diffs.lock().unwrap().push((files, token.to_string()));
        Ok(self.diff.clone().unwrap_or_default())
    }
}

/// The five production steps wired to fakes, with no MIME allow-list
pub fn fake_executor(source: Arc<FakeSource>, destination: Arc<FakeDestination>) -> PipelineExecutor {
    let steps: Vec<PipelineStep> = vec![
        TokenValidationStep::new(Arc::new(StaticTokens::default())).into(),
        ContentFetchingStep::new(source, 100 * 1024 * 1024, Vec::new()).into(),
        ContentRegistrationStep::new(destination.clone(), "scope-1".to_string(), "sharepoint".to_string()).into(),
        StorageUploadStep::new(destination.clone()).into(),
        IngestionFinalizationStep::new(destination, "scope-1".to_string()).into(),
    ];
    PipelineExecutor::new(steps, Duration::from_secs(30), Arc::new(NoopMetrics))
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Default)]
pub struct RecordingMetrics {
    pub step_durations: Mutex<Vec<(StepName, Duration)>>,
    pub pipelines: Mutex<Vec<bool>>,
    pub jobs: Mutex<Vec<Option<ErrorKind>>>,
    pub discovered: Mutex<Vec<(String, u64)>>,
    pub diff_results: Mutex<Vec<DiffCounts>>,
    pub queued: Mutex<Vec<u64>>,
    pub scans_completed: Mutex<usize>,
    pub scan_errors: Mutex<Vec<(String, String)>>,
}

impl MetricsSink for RecordingMetrics {
    fn scan_completed(&self, _duration: Duration) {
        *self.scans_completed.lock().unwrap() += 1;
    }

    fn files_discovered(&self, site: &str, count: u64) {
        self.discovered.lock().unwrap().push((site.to_string(), count));
    }

    fn file_diff_results(&self, counts: DiffCounts) {
        self.diff_results.lock().unwrap().push(counts);
    }

    fn files_queued(&self, count: u64) {
        self.queued.lock().unwrap().push(count);
    }

    fn scan_error(&self, site: &str, error_type: &str) {
        self.scan_errors
            .lock()
            .unwrap()
            .push((site.to_string(), error_type.to_string()));
    }

    fn pipeline_completed(&self, success: bool, _duration: Duration) {
        self.pipelines.lock().unwrap().push(success);
    }

    fn step_duration(&self, step: StepName, duration: Duration) {
        self.step_durations.lock().unwrap().push((step, duration));
    }

    fn job_completed(&self, failure: Option<ErrorKind>, _duration: Duration) {
        self.jobs.lock().unwrap().push(failure);
    }
}

// ============================================================================
// Lock
// ============================================================================

/// Memory lock backend that counts extensions and releases
pub struct CountingBackend {
    inner: Arc<MemoryLockBackend>,
    pub extends: AtomicUsize,
    pub releases: AtomicUsize,
    release_values: Mutex<Vec<Option<String>>>,
}

impl CountingBackend {
    pub fn new(inner: Arc<MemoryLockBackend>) -> Self {
        Self {
            inner,
            extends: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            release_values: Mutex::new(Vec::new()),
        }
    }

    pub fn last_release_value(&self) -> Option<String> {
        self.release_values.lock().unwrap().last().cloned().flatten()
    }
}

#[async_trait]
impl LockBackend for CountingBackend {
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        self.inner.try_acquire(key, value, ttl).await
    }

    async fn extend(&self, key: &str, value: Option<&str>, ttl: Duration) -> Result<bool, LockError> {
        self.extends.fetch_add(1, Ordering::SeqCst);
        self.inner.extend(key, value, ttl).await
    }

    async fn release(&self, key: &str, value: Option<&str>) -> Result<bool, LockError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.release_values
            .lock()
            .unwrap()
            .push(value.map(str::to_string));
        self.inner.release(key, value).await
    }
}
