//! Provider request metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Provider requests by provider, operation and status.
    pub const REQUESTS_TOTAL: &str = "gbatch_provider_requests_total";

    /// Provider request latency in seconds.
    pub const LATENCY_SECONDS: &str = "gbatch_provider_latency_seconds";
}

/// Record metrics for a completed provider request.
pub fn record_request(provider: &str, operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "provider" => provider.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "provider" => provider.to_string(),
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}
