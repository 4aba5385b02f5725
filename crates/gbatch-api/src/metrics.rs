//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "gbatch_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "gbatch_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "gbatch_http_requests_in_flight";
    pub const RUNS_TRIGGERED_TOTAL: &str = "gbatch_runs_triggered_total";
    pub const ARTIFACT_BUNDLE_BYTES: &str = "gbatch_artifact_bundle_bytes";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// `accepted` is false when the trigger was refused because a run was active.
pub fn record_run_triggered(accepted: bool) {
    let labels = [("accepted", accepted.to_string())];
    counter!(names::RUNS_TRIGGERED_TOTAL, &labels).increment(1);
}

pub fn record_bundle_size(bytes: usize) {
    histogram!(names::ARTIFACT_BUNDLE_BYTES).record(bytes as f64);
}

/// Metrics middleware for HTTP requests. Labels use the matched route so
/// unknown paths collapse into one series.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
