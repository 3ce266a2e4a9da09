use super::steps::{
    ContentFetchingStep, ContentRegistrationStep, IngestionFinalizationStep, StorageUploadStep,
    TokenValidationStep,
};
use super::{PipelineError, ProcessingContext};
use async_trait::async_trait;

/// The fixed stages of a pipeline run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepName {
    TokenValidation,
    ContentFetching,
    ContentRegistration,
    StorageUpload,
    IngestionFinalization,
}

impl StepName {
    pub const ALL: [StepName; 5] = [
        StepName::TokenValidation,
        StepName::ContentFetching,
        StepName::ContentRegistration,
        StepName::StorageUpload,
        StepName::IngestionFinalization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::TokenValidation => "token-validation",
            StepName::ContentFetching => "content-fetching",
            StepName::ContentRegistration => "content-registration",
            StepName::StorageUpload => "storage-upload",
            StepName::IngestionFinalization => "ingestion-finalization",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of a pipeline run
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError>;

    /// Runs after `execute`, whether it succeeded or failed
    async fn cleanup(&self, _ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// The five production steps
pub enum PipelineStep {
    TokenValidation(TokenValidationStep),
    ContentFetching(ContentFetchingStep),
    ContentRegistration(ContentRegistrationStep),
    StorageUpload(StorageUploadStep),
    IngestionFinalization(IngestionFinalizationStep),
}

macro_rules! dispatch {
    ($self:ident, $step:ident => $body:expr) => {
        match $self {
            PipelineStep::TokenValidation($step) => $body,
            PipelineStep::ContentFetching($step) => $body,
            PipelineStep::ContentRegistration($step) => $body,
            PipelineStep::StorageUpload($step) => $body,
            PipelineStep::IngestionFinalization($step) => $body,
        }
    };
}

#[async_trait]
impl Step for PipelineStep {
    fn name(&self) -> StepName {
        dispatch!(self, step => step.name())
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        dispatch!(self, step => step.execute(ctx).await)
    }

    async fn cleanup(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        dispatch!(self, step => step.cleanup(ctx).await)
    }
}

impl From<TokenValidationStep> for PipelineStep {
    fn from(step: TokenValidationStep) -> Self {
        PipelineStep::TokenValidation(step)
    }
}

impl From<ContentFetchingStep> for PipelineStep {
    fn from(step: ContentFetchingStep) -> Self {
        PipelineStep::ContentFetching(step)
    }
}

impl From<ContentRegistrationStep> for PipelineStep {
    fn from(step: ContentRegistrationStep) -> Self {
        PipelineStep::ContentRegistration(step)
    }
}

impl From<StorageUploadStep> for PipelineStep {
    fn from(step: StorageUploadStep) -> Self {
        PipelineStep::StorageUpload(step)
    }
}

impl From<IngestionFinalizationStep> for PipelineStep {
    fn from(step: IngestionFinalizationStep) -> Self {
        PipelineStep::IngestionFinalization(step)
    }
}
