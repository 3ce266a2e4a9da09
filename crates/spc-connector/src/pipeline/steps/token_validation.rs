use crate::auth::TokenProvider;
use crate::error::AuthError;
use crate::pipeline::context::{META_GRAPH_TOKEN, META_TOKENS, META_UNIQUE_TOKEN, META_VALIDATED_AT};
use crate::pipeline::{PipelineError, ProcessingContext, Step, StepName};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Obtains both bearer tokens up front so later steps never block on auth
pub struct TokenValidationStep {
    tokens: Arc<dyn TokenProvider>,
}

impl TokenValidationStep {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self { tokens }
    }
}

fn require(provider: &'static str, result: Result<String, AuthError>) -> Result<String, PipelineError> {
    match result {
        Ok(token) if !token.is_empty() => Ok(token),
        Ok(_) => Err(PipelineError::TokenUnavailable { provider, source: None }),
        Err(e) => Err(PipelineError::TokenUnavailable {
            provider,
            source: Some(e),
        }),
    }
}

#[async_trait]
impl Step for TokenValidationStep {
    fn name(&self) -> StepName {
        StepName::TokenValidation
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let (graph, unique) =
            tokio::join!(self.tokens.source_token(), self.tokens.destination_token());

        let graph = require("Microsoft Graph", graph)?;
        let unique = require("Zitadel", unique)?;

        ctx.metadata.insert(
            META_TOKENS.to_string(),
            json!({
                META_GRAPH_TOKEN: graph,
                META_UNIQUE_TOKEN: unique,
                META_VALIDATED_AT: Utc::now().to_rfc3339(),
            }),
        );

        debug!(correlation_id = %ctx.correlation_id, "Tokens validated");
        Ok(())
    }
}
