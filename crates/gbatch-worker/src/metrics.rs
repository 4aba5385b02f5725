//! Job and run metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Finished jobs by outcome.
    pub const JOBS_TOTAL: &str = "gbatch_jobs_total";

    /// Job pipeline duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "gbatch_job_duration_seconds";

    /// Retried provider calls by operation.
    pub const RETRIES_TOTAL: &str = "gbatch_retries_total";

    /// Jobs currently inside the pipeline.
    pub const JOBS_IN_PROGRESS: &str = "gbatch_jobs_in_progress";

    /// Run duration in seconds.
    pub const RUN_DURATION_SECONDS: &str = "gbatch_run_duration_seconds";
}

pub fn record_job(outcome: &'static str, duration: Duration) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome).record(duration.as_secs_f64());
}

pub fn record_retry(operation: &'static str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation).increment(1);
}

pub fn record_in_progress(count: usize) {
    gauge!(names::JOBS_IN_PROGRESS).set(count as f64);
}

pub fn record_run(duration: Duration) {
    histogram!(names::RUN_DURATION_SECONDS).record(duration.as_secs_f64());
}
