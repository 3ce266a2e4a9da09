use super::DEFAULT_MIME_TYPE;
use crate::clients::SourceClient;
use crate::pipeline::context::META_DRIVE_ID;
use crate::pipeline::{PipelineError, ProcessingContext, Step, StepName};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata paths that may hold the drive id, highest priority first
const DRIVE_ID_PATHS: [&[&str]; 3] = [
    &[META_DRIVE_ID],
    &["parentReference", "driveId"],
    &["listItem", "fields", "driveId"],
];

/// Downloads the file into the context's content buffer
pub struct ContentFetchingStep {
    source: Arc<dyn SourceClient>,
    max_file_size: u64,
    allowed_mime_types: Vec<String>,
}

impl ContentFetchingStep {
    pub fn new(source: Arc<dyn SourceClient>, max_file_size: u64, allowed_mime_types: Vec<String>) -> Self {
        Self {
            source,
            max_file_size,
            allowed_mime_types,
        }
    }

    fn check_mime_type(&self, mime_type: &str) -> Result<(), PipelineError> {
        if self.allowed_mime_types.is_empty()
            || self
                .allowed_mime_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
        {
            return Ok(());
        }

        Err(PipelineError::MimeTypeNotAllowed {
            mime_type: mime_type.to_string(),
            allowed: self.allowed_mime_types.join(", "),
        })
    }
}

fn resolve_drive_id(ctx: &ProcessingContext) -> Option<String> {
    DRIVE_ID_PATHS
        .iter()
        .find_map(|path| ctx.meta_str(path))
        .map(str::to_string)
}

#[async_trait]
impl Step for ContentFetchingStep {
    fn name(&self) -> StepName {
        StepName::ContentFetching
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let drive_id = resolve_drive_id(ctx).ok_or(PipelineError::MissingDriveId)?;

        let mime_type = ctx.mime_type().unwrap_or(DEFAULT_MIME_TYPE).to_string();
        self.check_mime_type(&mime_type)?;

        if ctx.file_size > self.max_file_size {
            warn!(
                correlation_id = %ctx.correlation_id,
                file_size = ctx.file_size,
                limit = self.max_file_size,
                "File exceeds size limit, skipping download"
            );
            return Err(PipelineError::FileTooLarge {
                limit: self.max_file_size,
            });
        }

        let mut stream = self.source.download_content(&drive_id, &ctx.file_id).await?;
        let mut buffer = BytesMut::with_capacity(ctx.file_size as usize);

        while let Some(chunk) = stream.try_next().await? {
            if (buffer.len() + chunk.len()) as u64 > self.max_file_size {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    received = buffer.len() + chunk.len(),
                    limit = self.max_file_size,
                    "Download aborted, file exceeds size limit"
                );
                return Err(PipelineError::FileTooLarge {
                    limit: self.max_file_size,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        ctx.file_size = buffer.len() as u64;
        ctx.content_buffer = Some(buffer.freeze());

        debug!(
            correlation_id = %ctx.correlation_id,
            drive_id = %drive_id,
            bytes = ctx.file_size,
            mime_type = %mime_type,
            "Content fetched"
        );
        Ok(())
    }
}
