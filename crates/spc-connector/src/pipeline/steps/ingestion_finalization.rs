use super::{source_name, DEFAULT_MIME_TYPE};
use crate::clients::{
    DestinationClient, IngestionFinalizationRequest, RegisteredContent, OWNER_TYPE_SCOPE, SOURCE_KIND,
    SOURCE_OWNER_TYPE_USER,
};
use crate::pipeline::context::{META_FINALIZATION, META_FINAL_CONTENT_ID, META_REGISTRATION};
use crate::pipeline::{PipelineError, ProcessingContext, Step, StepName};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Tells the destination the uploaded content is ready for ingestion
pub struct IngestionFinalizationStep {
    destination: Arc<dyn DestinationClient>,
    scope_id: String,
}

impl IngestionFinalizationStep {
    pub fn new(destination: Arc<dyn DestinationClient>, scope_id: String) -> Self {
        Self {
            destination,
            scope_id,
        }
    }
}

#[async_trait]
impl Step for IngestionFinalizationStep {
    fn name(&self) -> StepName {
        StepName::IngestionFinalization
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let registration: RegisteredContent = match ctx.metadata.get(META_REGISTRATION) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => return Err(PipelineError::MissingRegistration),
        };
        let token = ctx
            .destination_token()
            .ok_or(PipelineError::MissingDestinationToken)?
            .to_string();

        let request = IngestionFinalizationRequest {
            key: registration.key.clone(),
            mime_type: registration
                .mime_type
                .clone()
                .or_else(|| ctx.mime_type().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            owner_type: registration
                .owner_type
                .clone()
                .unwrap_or_else(|| OWNER_TYPE_SCOPE.to_string()),
            byte_size: ctx.file_size,
            scope_id: self.scope_id.clone(),
            source_owner_type: SOURCE_OWNER_TYPE_USER.to_string(),
            source_name: source_name(ctx.site_url()),
            source_kind: SOURCE_KIND.to_string(),
            file_url: registration.read_url.clone().unwrap_or_default(),
            content_id: registration.id.clone(),
        };

        let finalized = self.destination.finalize_ingestion(&request, &token).await?;

        ctx.metadata
            .insert(META_FINALIZATION.to_string(), serde_json::to_value(&finalized)?);
        ctx.metadata
            .insert(META_FINAL_CONTENT_ID.to_string(), json!(finalized.id));

        info!(
            correlation_id = %ctx.correlation_id,
            content_id = %finalized.id,
            key = %request.key,
            "Ingestion finalized"
        );
        Ok(())
    }
}
