//! Health and metrics HTTP surface

use crate::metrics::{MetricsSink, PrometheusMetrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, Level};

/// Shared health flag.
///
/// Reflects the latest scan or job outcome and mirrors itself into the
/// `connector_up` gauge.
#[derive(Clone)]
pub struct HealthFlag {
    healthy: Arc<AtomicBool>,
    metrics: Arc<dyn MetricsSink>,
}

impl HealthFlag {
    /// Starts out healthy
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        metrics.set_healthy(true);
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            metrics,
        }
    }

    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
        self.metrics.set_healthy(healthy);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct HealthState {
    health: HealthFlag,
    metrics: Arc<PrometheusMetrics>,
    started: Instant,
}

impl HealthState {
    pub fn new(health: HealthFlag, metrics: Arc<PrometheusMetrics>) -> Self {
        Self {
            health,
            metrics,
            started: Instant::now(),
        }
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/health/live", get(live))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Micros),
                ),
        )
}

fn status_code(healthy: bool) -> StatusCode {
    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let healthy = state.health.is_healthy();
    (
        status_code(healthy),
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "timestamp": Utc::now().to_rfc3339(),
            "uptime": state.started.elapsed().as_secs_f64(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    let healthy = state.health.is_healthy();
    (
        status_code(healthy),
        Json(json!({
            "status": if healthy { "ready" } else { "not ready" },
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

async fn live() -> impl IntoResponse {
    Json(json!({
        "status": "alive",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn metrics(State(state): State<HealthState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {e}")).into_response()
        },
    }
}
