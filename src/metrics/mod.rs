use crate::error::{GateError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GateError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "rategate_decisions_total",
            "Admission decisions by outcome"
        );
        describe_counter!(
            "rategate_rate_limit_exceeded_total",
            "Total number of requests rejected due to rate limiting"
        );
        describe_histogram!(
            "rategate_store_duration_seconds",
            "Latency of check-and-record store transactions in seconds"
        );
        describe_counter!(
            "rategate_store_errors_total",
            "Total number of failed store transactions"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record an admission decision
pub fn record_decision(outcome: &'static str) {
    counter!("rategate_decisions_total", "outcome" => outcome).increment(1);
}

/// Record rate limit exceeded
pub fn record_rate_limit_exceeded(path_key: &str) {
    let labels = [("path_key", path_key.to_string())];
    counter!("rategate_rate_limit_exceeded_total", &labels).increment(1);
}

/// Record one store round trip
pub fn record_store_latency(duration: f64, success: bool) {
    histogram!("rategate_store_duration_seconds").record(duration);
    if !success {
        counter!("rategate_store_errors_total").increment(1);
    }
}
