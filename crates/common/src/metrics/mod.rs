//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all ThesisTrack metrics
pub const METRICS_PREFIX: &str = "thesistrack";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for submissions, which include a durable file write
pub const UPLOAD_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Workflow metrics
    describe_counter!(
        format!("{}_submissions_total", METRICS_PREFIX),
        Unit::Count,
        "Cycle submissions by document kind, actor role and outcome"
    );

    describe_histogram!(
        format!("{}_submission_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Submission latency including the blob write"
    );

    describe_counter!(
        format!("{}_documents_opened_total", METRICS_PREFIX),
        Unit::Count,
        "Documents created by an initial upload"
    );

    describe_counter!(
        format!("{}_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Status decisions by requested status and outcome"
    );

    // Storage metrics
    describe_counter!(
        format!("{}_blob_bytes_written_total", METRICS_PREFIX),
        Unit::Bytes,
        "Bytes accepted into the blob store"
    );

    describe_counter!(
        format!("{}_blob_cleanups_total", METRICS_PREFIX),
        Unit::Count,
        "Compensating blob deletions after a failed submission"
    );

    describe_counter!(
        format!("{}_blob_cleanup_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Compensating blob deletions that failed and left an orphan"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a submission attempt
pub fn record_submission(kind: &str, role: &str, outcome: &str, elapsed: Duration) {
    counter!(
        format!("{}_submissions_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "role" => role.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_submission_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_document_opened(kind: &str) {
    counter!(
        format!("{}_documents_opened_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_decision(requested: &str, outcome: &str) {
    counter!(
        format!("{}_decisions_total", METRICS_PREFIX),
        "requested" => requested.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_blob_written(backend: &str, size: i64) {
    counter!(
        format!("{}_blob_bytes_written_total", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .increment(size.max(0) as u64);
}

/// Helper to record a compensating delete
pub fn record_blob_cleanup(backend: &str, success: bool) {
    counter!(
        format!("{}_blob_cleanups_total", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .increment(1);

    if !success {
        counter!(
            format!("{}_blob_cleanup_failures_total", METRICS_PREFIX),
            "backend" => backend.to_string()
        )
        .increment(1);
    }
}
