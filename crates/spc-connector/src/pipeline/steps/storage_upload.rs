use super::DEFAULT_MIME_TYPE;
use crate::clients::DestinationClient;
use crate::pipeline::{PipelineError, ProcessingContext, Step, StepName};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// PUTs the content buffer to the registered write URL
pub struct StorageUploadStep {
    destination: Arc<dyn DestinationClient>,
}

impl StorageUploadStep {
    pub fn new(destination: Arc<dyn DestinationClient>) -> Self {
        Self { destination }
    }
}

#[async_trait]
impl Step for StorageUploadStep {
    fn name(&self) -> StepName {
        StepName::StorageUpload
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let body = ctx
            .content_buffer
            .clone()
            .ok_or(PipelineError::MissingContentBuffer)?;
        let upload_url = ctx
            .upload_url
            .as_deref()
            .ok_or(PipelineError::MissingUploadUrl)?;
        let mime_type = ctx.mime_type().unwrap_or(DEFAULT_MIME_TYPE);
        let bytes = body.len();

        self.destination
            .upload_content(upload_url, mime_type, body)
            .await?;

        debug!(correlation_id = %ctx.correlation_id, bytes, "Content uploaded");
        Ok(())
    }

    async fn cleanup(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        ctx.content_buffer = None;
        Ok(())
    }
}
