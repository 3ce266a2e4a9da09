use super::{PipelineError, PipelineStep, ProcessingContext, Step, StepName};
use crate::clients::SyncItem;
use crate::metrics::MetricsSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{error, info, info_span, warn, Instrument};

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct PipelineResult {
    pub success: bool,
    pub context: ProcessingContext,
    pub error: Option<PipelineError>,
    /// Steps that finished, in execution order
    pub completed_steps: Vec<StepName>,
    pub failed_step: Option<StepName>,
    pub total_duration: Duration,
}

pub struct PipelineExecutor<S = PipelineStep> {
    steps: Vec<S>,
    step_timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl<S: Step> PipelineExecutor<S> {
    pub fn new(steps: Vec<S>, step_timeout: Duration, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            steps,
            step_timeout,
            metrics,
        }
    }

    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(S::name).collect()
    }

    /// Run every step for `item`.
    ///
    /// Never fails: any step error, including a timeout, is captured in the
    /// returned result.
    pub async fn process_item(&self, item: &SyncItem) -> PipelineResult {
        let ctx = ProcessingContext::from_item(item);
        let span = info_span!(
            "pipeline",
            correlation_id = %ctx.correlation_id,
            file_id = %ctx.file_id,
        );
        self.run(ctx).instrument(span).await
    }

    async fn run(&self, mut ctx: ProcessingContext) -> PipelineResult {
        info!(file_name = %ctx.file_name, file_size = ctx.file_size, "Pipeline started");
        let mut completed_steps = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let name = step.name();
            let started = Instant::now();

            // Dropping the step future on expiry cancels its in-flight work
            let outcome = match timeout(self.step_timeout, step.execute(&mut ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PipelineError::Timeout {
                    step: name,
                    timeout: self.step_timeout,
                }),
            };

            match outcome {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    ctx.step_timings.push((name, elapsed));
                    self.metrics.step_duration(name, elapsed);
                    completed_steps.push(name);
                    self.cleanup(step, &mut ctx).await;
                },
                Err(e) => {
                    error!(
                        correlation_id = %ctx.correlation_id,
                        step = %name,
                        error = %e,
                        error_kind = %e.kind(),
                        "Pipeline step failed"
                    );
                    self.cleanup(step, &mut ctx).await;

                    let total_duration = ctx.elapsed();
                    self.metrics.pipeline_completed(false, total_duration);
                    return PipelineResult {
                        success: false,
                        context: ctx,
                        error: Some(e),
                        completed_steps,
                        failed_step: Some(name),
                        total_duration,
                    };
                },
            }
        }

        ctx.content_buffer = None;
        ctx.metadata.clear();

        let total_duration = ctx.elapsed();
        self.metrics.pipeline_completed(true, total_duration);
        self.metrics.file_size(ctx.file_size);
        info!(
            correlation_id = %ctx.correlation_id,
            duration_ms = total_duration.as_millis() as u64,
            "Pipeline completed"
        );

        PipelineResult {
            success: true,
            context: ctx,
            error: None,
            completed_steps,
            failed_step: None,
            total_duration,
        }
    }

    async fn cleanup(&self, step: &S, ctx: &mut ProcessingContext) {
        if let Err(e) = step.cleanup(ctx).await {
            warn!(
                correlation_id = %ctx.correlation_id,
                step = %step.name(),
                error = %e,
                "Step cleanup failed"
            );
        }
    }
}
