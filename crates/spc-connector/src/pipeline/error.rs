use super::StepName;
use crate::error::{AuthError, DestinationError, SourceError};
use std::time::Duration;
use thiserror::Error;

/// Whether a failure might go away on a later attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Validation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Validation => "validation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one pipeline step
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Step {step} timed out after {}ms", .timeout.as_millis())]
    Timeout { step: StepName, timeout: Duration },

    #[error("Failed to obtain valid token from {provider}")]
    TokenUnavailable {
        provider: &'static str,
        #[source]
        source: Option<AuthError>,
    },

    #[error("Drive ID not found in file metadata")]
    MissingDriveId,

    #[error("MIME type {mime_type} is not allowed. Allowed types: {allowed}")]
    MimeTypeNotAllowed { mime_type: String, allowed: String },

    #[error("File size exceeds the maximum of {limit} bytes")]
    FileTooLarge { limit: u64 },

    #[error("Destination token not found in context - token validation may have failed")]
    MissingDestinationToken,

    #[error("Content buffer not found - content fetching may have failed")]
    MissingContentBuffer,

    #[error("Upload URL not found - content registration may have failed")]
    MissingUploadUrl,

    #[error("Registration response not found in context - content registration may have failed")]
    MissingRegistration,

    #[error("Content download failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("Invalid context data: {0}")]
    Context(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Timeout { .. }
            | PipelineError::TokenUnavailable { .. }
            | PipelineError::Source(_)
            | PipelineError::Destination(_) => ErrorKind::Transient,
            PipelineError::MissingDriveId
            | PipelineError::MimeTypeNotAllowed { .. }
            | PipelineError::FileTooLarge { .. }
            | PipelineError::MissingDestinationToken
            | PipelineError::MissingContentBuffer
            | PipelineError::MissingUploadUrl
            | PipelineError::MissingRegistration
            | PipelineError::Context(_) => ErrorKind::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
