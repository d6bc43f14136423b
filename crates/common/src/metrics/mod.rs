//! Metrics and observability utilities
//!
//! Prometheus metrics for the query pipeline with standardized naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PaperLens metrics
pub const METRICS_PREFIX: &str = "paperlens";

/// Buckets for external service latency (planning and analysis are slow)
pub const SERVICE_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
    120.0, // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total query executions by outcome"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    describe_counter!(
        format!("{}_service_calls_total", METRICS_PREFIX),
        Unit::Count,
        "External service calls by service and status"
    );

    describe_histogram!(
        format!("{}_service_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External service call latency in seconds"
    );

    describe_counter!(
        format!("{}_service_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retried external service calls"
    );

    describe_counter!(
        format!("{}_extracted_items_total", METRICS_PREFIX),
        Unit::Count,
        "Content items extracted by content type"
    );

    describe_counter!(
        format!("{}_orphaned_citations_total", METRICS_PREFIX),
        Unit::Count,
        "Citation markers without a matching reference"
    );

    tracing::info!("Metrics registered");
}

/// Times one pipeline stage
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record stage completion and return elapsed milliseconds
    pub fn finish(self) -> u64 {
        let elapsed = self.start.elapsed();

        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage
        )
        .record(elapsed.as_secs_f64());

        elapsed.as_millis() as u64
    }
}

/// Helper to record an external service call
pub fn record_service_call(service: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_service_calls_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_service_call_duration_seconds", METRICS_PREFIX),
        "service" => service.to_string()
    )
    .record(duration_secs);
}

pub fn record_retry(service: &str) {
    counter!(
        format!("{}_service_retries_total", METRICS_PREFIX),
        "service" => service.to_string()
    )
    .increment(1);
}

pub fn record_extracted_items(content_type: &str, count: usize) {
    counter!(
        format!("{}_extracted_items_total", METRICS_PREFIX),
        "content_type" => content_type.to_string()
    )
    .increment(count as u64);
}

pub fn record_orphaned_citations(count: usize) {
    if count == 0 {
        return;
    }
    counter!(format!("{}_orphaned_citations_total", METRICS_PREFIX)).increment(count as u64);
}

/// Helper to record the terminal outcome of a query
pub fn record_query(outcome: &str) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
