//! Admission-control metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Rate-limiter acquisitions by limiter and whether they waited.
    pub const RATE_ACQUIRE_TOTAL: &str = "gbatch_rate_limiter_acquire_total";

    /// Time spent waiting for a token, in seconds.
    pub const RATE_WAIT_SECONDS: &str = "gbatch_rate_limiter_wait_seconds";

    /// Slots currently held by gate.
    pub const GATE_ACTIVE: &str = "gbatch_gate_active";

    /// Upload call duration in seconds by outcome.
    pub const UPLOAD_DURATION_SECONDS: &str = "gbatch_upload_duration_seconds";

    /// Upload limit changes by direction (downgrade/upgrade).
    pub const UPLOAD_LIMIT_CHANGES_TOTAL: &str = "gbatch_upload_limit_changes_total";

    /// Circuit breaker trips.
    pub const BREAKER_TRIPS_TOTAL: &str = "gbatch_circuit_breaker_trips_total";

    /// Attempts rejected while the breaker was open.
    pub const BREAKER_REJECTIONS_TOTAL: &str = "gbatch_circuit_breaker_rejections_total";
}

pub fn record_rate_acquire(limiter: &str, waited: Option<Duration>) {
    let waited_label = if waited.is_some() { "true" } else { "false" };
    counter!(
        names::RATE_ACQUIRE_TOTAL,
        "limiter" => limiter.to_string(),
        "waited" => waited_label
    )
    .increment(1);

    if let Some(wait) = waited {
        histogram!(names::RATE_WAIT_SECONDS, "limiter" => limiter.to_string())
            .record(wait.as_secs_f64());
    }
}

pub fn record_gate_active(gate: &str, active: usize) {
    gauge!(names::GATE_ACTIVE, "gate" => gate.to_string()).set(active as f64);
}

pub fn record_upload(duration: Duration, outcome: &'static str) {
    histogram!(names::UPLOAD_DURATION_SECONDS, "outcome" => outcome).record(duration.as_secs_f64());
}

pub fn record_upload_limit_change(direction: &'static str) {
    counter!(names::UPLOAD_LIMIT_CHANGES_TOTAL, "direction" => direction).increment(1);
}

pub fn record_breaker_trip() {
    counter!(names::BREAKER_TRIPS_TOTAL).increment(1);
}

pub fn record_breaker_rejection() {
    counter!(names::BREAKER_REJECTIONS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::RATE_ACQUIRE_TOTAL.starts_with("gbatch_"));
        assert!(names::UPLOAD_DURATION_SECONDS.ends_with("_seconds"));
        assert!(names::BREAKER_TRIPS_TOTAL.contains("breaker"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_rate_acquire("vision", Some(Duration::from_millis(5)));
        record_upload(Duration::from_secs(1), "ok");
        record_breaker_trip();
    }
}
