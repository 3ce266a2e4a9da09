//! Microsoft Graph client for SharePoint document libraries

use super::types::{DriveItem, ItemReference};
use super::{ByteStream, SourceClient};
use crate::auth::TokenProvider;
use crate::config::{GraphConfig, SharePointConfig};
use crate::error::SourceError;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Page size requested for folder listings.
const PAGE_SIZE: &str = "200";

/// List column carrying the approval state of a file.
const MODERATION_STATUS_FIELD: &str = "_ModerationStatus";

/// Paged collection response
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Drive {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    sync_column: String,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        graph: &GraphConfig,
        sharepoint: &SharePointConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: graph.api_base_url.trim_end_matches('/').to_string(),
            tokens,
            sync_column: sharepoint.sync_column_name.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        let token = self.tokens.source_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// Follow `@odata.nextLink` until the collection is exhausted
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, SourceError> {
        let mut page: Page<T> = self.get_json(first).await?;
        let mut items = std::mem::take(&mut page.value);

        while let Some(next) = page.next_link.take() {
            page = self.get_json(self.http.get(&next)).await?;
            items.append(&mut page.value);
        }

        Ok(items)
    }

    async fn list_drives(&self, site_id: &str) -> Result<Vec<Drive>, SourceError> {
        let url = format!("{}/sites/{}/drives", self.base_url, site_id);
        self.collect_pages(self.http.get(url)).await
    }

    async fn list_children(&self, drive_id: &str, folder_id: &str) -> Result<Vec<DriveItem>, SourceError> {
        let url = format!("{}/drives/{}/items/{}/children", self.base_url, drive_id, folder_id);
        let request = self
            .http
            .get(url)
            .query(&[("$expand", "listItem($expand=fields)"), ("$top", PAGE_SIZE)]);
        self.collect_pages(request).await
    }

    /// Walk a drive depth first, keeping files that pass [`Self::is_syncable`]
    async fn drive_files(&self, site_id: &str, drive: &Drive) -> Result<Vec<DriveItem>, SourceError> {
        let mut pending = vec!["root".to_string()];
        let mut files = Vec::new();

        while let Some(folder_id) = pending.pop() {
            for mut item in self.list_children(&drive.id, &folder_id).await? {
                if item.folder.is_some() {
                    pending.push(item.id.clone());
                    continue;
                }
                if !self.is_syncable(&item) {
                    continue;
                }

                let parent = item.parent_reference.get_or_insert_with(ItemReference::default);
                parent.drive_id.get_or_insert_with(|| drive.id.clone());
                parent.site_id.get_or_insert_with(|| site_id.to_string());
                files.push(item);
            }
        }

        debug!(
            site_id = %site_id,
            drive_id = %drive.id,
            drive_name = drive.name.as_deref().unwrap_or_default(),
            files = files.len(),
            "Scanned drive"
        );
        Ok(files)
    }

    /// Flagged by the sync column and not pending or rejected in moderation
    fn is_syncable(&self, item: &DriveItem) -> bool {
        let Some(fields) = item.list_item_fields() else {
            return false;
        };

        let flagged = matches!(fields.get(&self.sync_column), Some(Value::Bool(true)));
        let approved = match fields.get(MODERATION_STATUS_FIELD) {
            None | Some(Value::Null) => true,
            Some(Value::Number(n)) => n.as_i64() == Some(0),
            Some(Value::String(s)) => s == "0",
            Some(_) => false,
        };

        flagged && approved
    }
}

#[async_trait]
impl SourceClient for GraphClient {
    async fn list_syncable_items(&self, site_id: &str) -> Result<Vec<DriveItem>, SourceError> {
        let mut items = Vec::new();
        for drive in self.list_drives(site_id).await? {
            items.extend(self.drive_files(site_id, &drive).await?);
        }

        info!(site_id = %site_id, files = items.len(), "Listed syncable files");
        Ok(items)
    }

    async fn download_content(&self, drive_id: &str, item_id: &str) -> Result<ByteStream, SourceError> {
        let url = format!("{}/drives/{}/items/{}/content", self.base_url, drive_id, item_id);
        let token = self.tokens.source_token().await?;

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.bytes_stream().map_err(SourceError::from).boxed())
    }
}
