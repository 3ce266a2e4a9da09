//! Per-run processing state

use super::StepName;
use crate::clients::SyncItem;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use spc_common::CorrelationId;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Metadata handoff keys
// ============================================================================

pub const META_TOKENS: &str = "tokens";
pub const META_GRAPH_TOKEN: &str = "graphApiToken";
pub const META_UNIQUE_TOKEN: &str = "uniqueApiToken";
pub const META_VALIDATED_AT: &str = "validatedAt";
pub const META_MIME_TYPE: &str = "mimeType";
pub const META_DRIVE_ID: &str = "driveId";
pub const META_SITE_ID: &str = "siteId";
pub const META_REGISTRATION: &str = "registrationResponse";
pub const META_FINALIZATION: &str = "finalizationResponse";
pub const META_FINAL_CONTENT_ID: &str = "finalContentId";

/// Mutable record threaded through the steps of one pipeline run.
///
/// The source location fields are fixed at construction and only readable
/// afterwards.
pub struct ProcessingContext {
    pub correlation_id: CorrelationId,
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    site_url: String,
    library_name: String,
    download_url: Option<String>,
    pub upload_url: Option<String>,
    pub unique_content_id: Option<String>,
    pub content_buffer: Option<Bytes>,
    pub start_time: DateTime<Utc>,
    started: Instant,
    pub step_timings: Vec<(StepName, Duration)>,
    pub metadata: Map<String, Value>,
}

impl ProcessingContext {
    pub fn from_item(sync: &SyncItem) -> Self {
        let item = &sync.item;
        let site_id = item.site_id().unwrap_or(&sync.site_id);

        let mut metadata = Map::new();
        metadata.insert(META_MIME_TYPE.to_string(), json!(item.mime_type()));
        metadata.insert("isFolder".to_string(), json!(item.folder.is_some()));
        metadata.insert("listItemFields".to_string(), json!(item.list_item_fields()));
        metadata.insert(META_DRIVE_ID.to_string(), json!(item.drive_id()));
        metadata.insert(META_SITE_ID.to_string(), json!(site_id));
        metadata.insert(
            "lastModifiedDateTime".to_string(),
            json!(item.last_modified_date_time),
        );
        if let Ok(Value::Object(fields)) = serde_json::to_value(item) {
            metadata.extend(fields);
        }

        Self {
            correlation_id: CorrelationId::new(),
            file_id: item.id.clone(),
            file_name: item.name.clone(),
            file_size: item.size.unwrap_or(0),
            site_url: item.web_url.clone(),
            library_name: item.drive_id().unwrap_or_default().to_string(),
            download_url: Some(item.web_url.clone()).filter(|u| !u.is_empty()),
            upload_url: None,
            unique_content_id: None,
            content_buffer: None,
            start_time: Utc::now(),
            started: Instant::now(),
            step_timings: Vec::new(),
            metadata,
        }
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Non-empty string at a nested metadata path
    pub fn meta_str(&self, path: &[&str]) -> Option<&str> {
        let (first, rest) = path.split_first()?;
        let mut value = self.metadata.get(*first)?;
        for key in rest {
            value = value.get(*key)?;
        }
        value.as_str().filter(|s| !s.is_empty())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.meta_str(&[META_MIME_TYPE])
    }

    /// Destination bearer token stored by token validation
    pub fn destination_token(&self) -> Option<&str> {
        self.meta_str(&[META_TOKENS, META_UNIQUE_TOKEN])
    }

    pub fn content_len(&self) -> usize {
        self.content_buffer.as_ref().map_or(0, Bytes::len)
    }
}

impl std::fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("correlation_id", &self.correlation_id)
            .field("file_id", &self.file_id)
            .field("file_name", &self.file_name)
            .field("file_size", &self.file_size)
            .field("site_url", &self.site_url)
            .field("library_name", &self.library_name)
            .field("upload_url", &self.upload_url.as_ref().map(|_| "<set>"))
            .field("unique_content_id", &self.unique_content_id)
            .field("content_buffer_len", &self.content_len())
            .field("metadata_keys", &self.metadata.keys().collect::<Vec<_>>())
            .finish()
    }
}
