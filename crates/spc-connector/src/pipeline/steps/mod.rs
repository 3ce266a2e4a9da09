//! The five pipeline steps

mod content_fetching;
mod content_registration;
mod ingestion_finalization;
mod storage_upload;
mod token_validation;

pub use content_fetching::ContentFetchingStep;
pub use content_registration::ContentRegistrationStep;
pub use ingestion_finalization::IngestionFinalizationStep;
pub use storage_upload::StorageUploadStep;
pub use token_validation::TokenValidationStep;

use super::PipelineStep;
use crate::auth::TokenProvider;
use crate::clients::{DestinationClient, SourceClient};
use crate::config::Config;
use std::sync::Arc;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Source name used when the site URL yields nothing better.
pub const DEFAULT_SOURCE_NAME: &str = "SharePoint";

/// The production step list in execution order
pub fn standard_steps(
    config: &Config,
    tokens: Arc<dyn TokenProvider>,
    source: Arc<dyn SourceClient>,
    destination: Arc<dyn DestinationClient>,
) -> Vec<PipelineStep> {
    vec![
        TokenValidationStep::new(tokens).into(),
        ContentFetchingStep::new(
            source,
            config.processing.max_file_size_bytes,
            config.processing.allowed_mime_types.clone(),
        )
        .into(),
        ContentRegistrationStep::new(
            destination.clone(),
            config.unique.scope_id.clone(),
            config.unique.content_key_prefix.clone(),
        )
        .into(),
        StorageUploadStep::new(destination.clone()).into(),
        IngestionFinalizationStep::new(destination, config.unique.scope_id.clone()).into(),
    ]
}

/// Human-readable site name from a SharePoint URL.
///
/// `https://host/sites/Finance/...` yields `Finance`, any other URL its host.
pub fn source_name(site_url: &str) -> String {
    let Ok(parsed) = url::Url::parse(site_url) else {
        return DEFAULT_SOURCE_NAME.to_string();
    };

    let site = parsed.path_segments().and_then(|mut segments| {
        segments
            .by_ref()
            .find(|s| *s == "sites")
            .and_then(|_| segments.next())
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|name| name.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
    });

    site.or_else(|| parsed.host_str().filter(|h| !h.is_empty()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string())
}
