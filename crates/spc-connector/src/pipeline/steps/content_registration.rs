use super::{source_name, DEFAULT_MIME_TYPE};
use crate::clients::{
    ContentRegistrationRequest, DestinationClient, OWNER_TYPE_SCOPE, SOURCE_KIND, SOURCE_OWNER_TYPE_USER,
};
use crate::pipeline::context::{META_DRIVE_ID, META_REGISTRATION, META_SITE_ID};
use crate::pipeline::{PipelineError, ProcessingContext, Step, StepName};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Registers the file with the destination and obtains its upload URL
pub struct ContentRegistrationStep {
    destination: Arc<dyn DestinationClient>,
    scope_id: String,
    key_prefix: String,
}

impl ContentRegistrationStep {
    pub fn new(destination: Arc<dyn DestinationClient>, scope_id: String, key_prefix: String) -> Self {
        Self {
            destination,
            scope_id,
            key_prefix,
        }
    }

    /// `{prefix}_{siteId}_{driveId}_{fileId}`
    pub fn content_key(&self, ctx: &ProcessingContext) -> String {
        format!(
            "{}_{}_{}_{}",
            self.key_prefix,
            ctx.meta_str(&[META_SITE_ID]).unwrap_or("unknown-site"),
            ctx.meta_str(&[META_DRIVE_ID]).unwrap_or("unknown-drive"),
            ctx.file_id
        )
    }
}

#[async_trait]
impl Step for ContentRegistrationStep {
    fn name(&self) -> StepName {
        StepName::ContentRegistration
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let token = ctx
            .destination_token()
            .ok_or(PipelineError::MissingDestinationToken)?
            .to_string();

        let request = ContentRegistrationRequest {
            key: self.content_key(ctx),
            mime_type: ctx.mime_type().unwrap_or(DEFAULT_MIME_TYPE).to_string(),
            owner_type: OWNER_TYPE_SCOPE.to_string(),
            scope_id: self.scope_id.clone(),
            source_owner_type: SOURCE_OWNER_TYPE_USER.to_string(),
            source_kind: SOURCE_KIND.to_string(),
            source_name: source_name(ctx.site_url()),
        };

        let registered = self.destination.register_content(&request, &token).await?;

        ctx.upload_url = registered.write_url.clone();
        ctx.unique_content_id = Some(registered.id.clone());
        ctx.metadata
            .insert(META_REGISTRATION.to_string(), serde_json::to_value(&registered)?);

        debug!(
            correlation_id = %ctx.correlation_id,
            content_id = %registered.id,
            key = %registered.key,
            "Content registered"
        );
        Ok(())
    }
}
