//! HTTP clients for the systems the connector sits between
//!
//! The pipeline and the scanner only see the [`SourceClient`] and
//! [`DestinationClient`] traits.

mod graph;
pub mod types;
mod unique;

pub use graph::GraphClient;
pub use types::*;
pub use unique::{UniqueClient, OWNER_TYPE_SCOPE, SOURCE_KIND, SOURCE_OWNER_TYPE_USER};

use crate::error::{DestinationError, SourceError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Streamed body of a downloaded file
pub type ByteStream = BoxStream<'static, Result<Bytes, SourceError>>;

/// Document library discovery and download
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Every file in the site that is flagged for synchronisation
    async fn list_syncable_items(&self, site_id: &str) -> Result<Vec<DriveItem>, SourceError>;

    async fn download_content(&self, drive_id: &str, item_id: &str) -> Result<ByteStream, SourceError>;
}

/// Destination content store
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn register_content(
        &self,
        request: &ContentRegistrationRequest,
        token: &str,
    ) -> Result<RegisteredContent, DestinationError>;

    /// PUT the bytes to a pre-signed write URL
    async fn upload_content(
        &self,
        write_url: &str,
        mime_type: &str,
        body: Bytes,
    ) -> Result<(), DestinationError>;

    async fn finalize_ingestion(
        &self,
        request: &IngestionFinalizationRequest,
        token: &str,
    ) -> Result<FinalizedIngestion, DestinationError>;

    async fn diff_files(
        &self,
        files: Vec<FileDiffItem>,
        token: &str,
    ) -> Result<FileDiffResponse, DestinationError>;
}
