//! Connector metrics
//!
//! Components report through the fire-and-forget [`MetricsSink`] trait.
//! [`PrometheusMetrics`] backs it with a private registry rendered on
//! `GET /metrics`; [`NoopMetrics`] discards everything.

use crate::pipeline::{ErrorKind, StepName};
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix
const PREFIX: &str = "sharepoint";

/// Result counts of one file-diff call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub new_and_updated: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub moved: u64,
}

pub trait MetricsSink: Send + Sync {
    fn scan_started(&self) {}
    fn scan_completed(&self, _duration: Duration) {}
    fn files_discovered(&self, _site: &str, _count: u64) {}
    fn file_diff_results(&self, _counts: DiffCounts) {}
    fn files_queued(&self, _count: u64) {}
    fn scan_error(&self, _site: &str, _error_type: &str) {}
    fn pipeline_completed(&self, _success: bool, _duration: Duration) {}
    fn step_duration(&self, _step: StepName, _duration: Duration) {}
    fn file_size(&self, _bytes: u64) {}
    fn queue_size(&self, _depth: u64) {}
    fn job_completed(&self, _failure: Option<ErrorKind>, _duration: Duration) {}
    fn set_healthy(&self, _healthy: bool) {}
}

/// Discards every observation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

pub struct PrometheusMetrics {
    registry: Registry,
    scan_total: Counter,
    scan_duration: Histogram,
    files_discovered: CounterVec,
    file_diff_results: CounterVec,
    files_queued: Counter,
    scan_errors: CounterVec,
    pipeline_executions: CounterVec,
    pipeline_duration: Histogram,
    step_duration: HistogramVec,
    files_processed: CounterVec,
    file_size: Histogram,
    queue_size: IntGauge,
    jobs_processed: CounterVec,
    jobs_duration: Histogram,
    connector_up: IntGauge,
}

fn name(metric: &str) -> String {
    format!("{PREFIX}_{metric}")
}

fn histogram(metric: &str, help: &str, buckets: &[f64]) -> prometheus::Result<Histogram> {
    Histogram::with_opts(HistogramOpts::new(name(metric), help).buckets(buckets.to_vec()))
}

impl PrometheusMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let metrics = Self {
            registry: Registry::new(),
            scan_total: Counter::new(name("scan_total"), "Total number of scans started")?,
            scan_duration: histogram(
                "scan_duration_seconds",
                "Scan duration in seconds",
                &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0],
            )?,
            files_discovered: CounterVec::new(
                Opts::new(name("files_discovered_total"), "Files discovered per site"),
                &["site"],
            )?,
            file_diff_results: CounterVec::new(
                Opts::new(name("file_diff_results_total"), "File diff results by type"),
                &["result_type"],
            )?,
            files_queued: Counter::new(name("files_queued_total"), "Files queued for processing")?,
            scan_errors: CounterVec::new(
                Opts::new(name("scan_errors_total"), "Scan errors"),
                &["site", "error_type"],
            )?,
            pipeline_executions: CounterVec::new(
                Opts::new(name("pipeline_executions_total"), "Pipeline executions by status"),
                &["status"],
            )?,
            pipeline_duration: histogram(
                "pipeline_duration_seconds",
                "Pipeline duration in seconds",
                &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0],
            )?,
            step_duration: HistogramVec::new(
                HistogramOpts::new(name("pipeline_step_duration_seconds"), "Pipeline step duration in seconds")
                    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
                &["step"],
            )?,
            files_processed: CounterVec::new(
                Opts::new(name("files_processed_total"), "Files processed by status"),
                &["status"],
            )?,
            file_size: histogram(
                "file_size_bytes",
                "Size of processed files in bytes",
                &[1024.0, 10240.0, 102400.0, 1048576.0, 10485760.0, 104857600.0],
            )?,
            queue_size: IntGauge::new(name("queue_size"), "Jobs waiting in the processing queue")?,
            jobs_processed: CounterVec::new(
                Opts::new(name("jobs_processed_total"), "Jobs processed by status"),
                &["status", "failure_kind"],
            )?,
            jobs_duration: histogram(
                "jobs_duration_seconds",
                "Job duration in seconds",
                &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0],
            )?,
            connector_up: IntGauge::new(name("connector_up"), "Whether the connector is healthy")?,
        };

        let r = &metrics.registry;
        r.register(Box::new(metrics.scan_total.clone()))?;
        r.register(Box::new(metrics.scan_duration.clone()))?;
        r.register(Box::new(metrics.files_discovered.clone()))?;
        r.register(Box::new(metrics.file_diff_results.clone()))?;
        r.register(Box::new(metrics.files_queued.clone()))?;
        r.register(Box::new(metrics.scan_errors.clone()))?;
        r.register(Box::new(metrics.pipeline_executions.clone()))?;
        r.register(Box::new(metrics.pipeline_duration.clone()))?;
        r.register(Box::new(metrics.step_duration.clone()))?;
        r.register(Box::new(metrics.files_processed.clone()))?;
        r.register(Box::new(metrics.file_size.clone()))?;
        r.register(Box::new(metrics.queue_size.clone()))?;
        r.register(Box::new(metrics.jobs_processed.clone()))?;
        r.register(Box::new(metrics.jobs_duration.clone()))?;
        r.register(Box::new(metrics.connector_up.clone()))?;

        Ok(metrics)
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

impl MetricsSink for PrometheusMetrics {
    fn scan_started(&self) {
        self.scan_total.inc();
    }

    fn scan_completed(&self, duration: Duration) {
        self.scan_duration.observe(duration.as_secs_f64());
    }

    fn files_discovered(&self, site: &str, count: u64) {
        self.files_discovered
            .with_label_values(&[site])
            .inc_by(count as f64);
    }

    fn file_diff_results(&self, counts: DiffCounts) {
        for (result_type, count) in [
            ("new_and_updated", counts.new_and_updated),
            ("unchanged", counts.unchanged),
            ("deleted", counts.deleted),
            ("moved", counts.moved),
        ] {
            self.file_diff_results
                .with_label_values(&[result_type])
                .inc_by(count as f64);
        }
    }

    fn files_queued(&self, count: u64) {
        self.files_queued.inc_by(count as f64);
    }

    fn scan_error(&self, site: &str, error_type: &str) {
        self.scan_errors.with_label_values(&[site, error_type]).inc();
    }

    fn pipeline_completed(&self, success: bool, duration: Duration) {
        self.pipeline_executions
            .with_label_values(&[status(success)])
            .inc();
        self.files_processed.with_label_values(&[status(success)]).inc();
        self.pipeline_duration.observe(duration.as_secs_f64());
    }

    fn step_duration(&self, step: StepName, duration: Duration) {
        self.step_duration
            .with_label_values(&[step.as_str()])
            .observe(duration.as_secs_f64());
    }

    fn file_size(&self, bytes: u64) {
        self.file_size.observe(bytes as f64);
    }

    fn queue_size(&self, depth: u64) {
        self.queue_size.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    fn job_completed(&self, failure: Option<ErrorKind>, duration: Duration) {
        let kind = failure.map_or("none", ErrorKind::as_str);
        self.jobs_processed
            .with_label_values(&[status(failure.is_none()), kind])
            .inc();
        self.jobs_duration.observe(duration.as_secs_f64());
    }

    fn set_healthy(&self, healthy: bool) {
        self.connector_up.set(i64::from(healthy));
    }
}
