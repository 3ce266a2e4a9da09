//! Unique ingestion API client
//!
//! Registration and finalisation are GraphQL `contentUpsert` mutations, the
//! file diff is a REST call. All API calls go through one gate that spaces
//! request starts at least [`MIN_REQUEST_INTERVAL`] apart. The gate is only
//! held while waiting for a start slot, so requests may overlap in flight.

use super::types::*;
use super::DestinationClient;
use crate::config::UniqueConfig;
use crate::error::DestinationError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::error;

pub const SOURCE_KIND: &str = "MICROSOFT_365_SHAREPOINT";
pub const OWNER_TYPE_SCOPE: &str = "SCOPE";
pub const SOURCE_OWNER_TYPE_USER: &str = "USER";

/// Source name reported with file-diff requests.
pub const DIFF_SOURCE_NAME: &str = "SharePoint Online Connector";

/// Destination rate limit: 600 requests per minute.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(50);

const REGISTER_MUTATION: &str = r#"
mutation ContentUpsert(
  $input: ContentCreateInput!
  $fileUrl: String
  $chatId: String
  $scopeId: String
  $sourceOwnerType: String
  $sourceName: String
  $sourceKind: String
  $storeInternally: Boolean
) {
  contentUpsert(
    input: $input
    fileUrl: $fileUrl
    chatId: $chatId
    scopeId: $scopeId
    sourceOwnerType: $sourceOwnerType
    sourceName: $sourceName
    sourceKind: $sourceKind
    storeInternally: $storeInternally
  ) {
    id
    key
    byteSize
    mimeType
    ownerType
    ownerId
    writeUrl
    readUrl
    createdAt
    internallyStoredAt
  }
}"#;

const FINALIZE_MUTATION: &str = r#"
mutation ContentUpsert(
  $input: ContentCreateInput!
  $scopeId: String
  $fileUrl: String
  $sourceOwnerType: String
  $sourceName: String
  $sourceKind: String
) {
  contentUpsert(
    input: $input
    scopeId: $scopeId
    fileUrl: $fileUrl
    sourceOwnerType: $sourceOwnerType
    sourceName: $sourceName
    sourceKind: $sourceKind
  ) {
    id
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<ContentUpsertData<T>>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentUpsertData<T> {
    content_upsert: Option<T>,
}

pub struct UniqueClient {
    http: reqwest::Client,
    graphql_url: String,
    ingestion_url: String,
    scope_id: String,
    partial_key: String,
    diff_base_path: String,
    gate: Mutex<Option<Instant>>,
}

impl UniqueClient {
    pub fn new(http: reqwest::Client, config: &UniqueConfig) -> Self {
        Self {
            http,
            graphql_url: config.graphql_url.clone(),
            ingestion_url: config.ingestion_url.trim_end_matches('/').to_string(),
            scope_id: config.scope_id.clone(),
            partial_key: config.content_key_prefix.clone(),
            diff_base_path: config.diff_base_path.clone(),
            gate: Mutex::new(None),
        }
    }

    async fn rate_limited<T, F>(&self, request: F) -> T
    where
        F: Future<Output = T>,
    {
        {
            let mut last_start = self.gate.lock().await;
            if let Some(previous) = *last_start {
                tokio::time::sleep_until(previous + MIN_REQUEST_INTERVAL).await;
            }
            *last_start = Some(Instant::now());
        }
        request.await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
        token: &str,
    ) -> Result<T, DestinationError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DestinationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn content_upsert<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        body: Value,
        token: &str,
    ) -> Result<T, DestinationError> {
        let response: GraphQlResponse<T> = self
            .rate_limited(self.post_json(&self.graphql_url, &body, token))
            .await
            .inspect_err(|e| error!(operation, error = %e, "Destination API call failed"))?;

        match response.data.and_then(|d| d.content_upsert) {
            Some(content) => Ok(content),
            None => {
                let reason = response
                    .errors
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "missing data.contentUpsert".to_string());
                Err(DestinationError::invalid(operation, reason))
            },
        }
    }
}

#[async_trait]
impl DestinationClient for UniqueClient {
    async fn register_content(
        &self,
        request: &ContentRegistrationRequest,
        token: &str,
    ) -> Result<RegisteredContent, DestinationError> {
        let body = json!({
            "query": REGISTER_MUTATION,
            "variables": {
                "input": {
                    "key": request.key,
                    "mimeType": request.mime_type,
                    "ownerType": request.owner_type,
                },
                "scopeId": request.scope_id,
                "sourceOwnerType": request.source_owner_type,
                "sourceKind": request.source_kind,
                "sourceName": request.source_name,
                "storeInternally": true,
            }
        });

        self.content_upsert("content registration", body, token).await
    }

    async fn upload_content(
        &self,
        write_url: &str,
        mime_type: &str,
        body: Bytes,
    ) -> Result<(), DestinationError> {
        let response = self
            .http
            .put(write_url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .header("x-ms-blob-type", "BlockBlob")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DestinationError::Upload {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        Ok(())
    }

    async fn finalize_ingestion(
        &self,
        request: &IngestionFinalizationRequest,
        token: &str,
    ) -> Result<FinalizedIngestion, DestinationError> {
        let body = json!({
            "query": FINALIZE_MUTATION,
            "variables": {
                "input": {
                    "key": request.key,
                    "mimeType": request.mime_type,
                    "ownerType": request.owner_type,
                    "byteSize": request.byte_size,
                },
                "scopeId": request.scope_id,
                "fileUrl": request.file_url,
                "sourceOwnerType": request.source_owner_type,
                "sourceName": request.source_name,
                "sourceKind": request.source_kind,
            }
        });

        self.content_upsert("ingestion finalization", body, token).await
    }

    async fn diff_files(
        &self,
        files: Vec<FileDiffItem>,
        token: &str,
    ) -> Result<FileDiffResponse, DestinationError> {
        let request = FileDiffRequest {
            base_path: self.diff_base_path.clone(),
            partial_key: self.partial_key.clone(),
            source_kind: SOURCE_KIND.to_string(),
            source_name: DIFF_SOURCE_NAME.to_string(),
            file_list: files,
            scope: self.scope_id.clone(),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| DestinationError::invalid("file diff", e.to_string()))?;
        let url = format!("{}/file-diff", self.ingestion_url);

        self.rate_limited(self.post_json(&url, &body, token))
            .await
            .inspect_err(|e| error!(error = %e, "File diff failed"))
    }
}
