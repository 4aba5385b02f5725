//! Run progress aggregation.
//!
//! The pipeline reports every job transition here; the driver reads a
//! snapshot for the end-of-run summary and the API reads it for live status.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use gbatch_models::JobId;

use crate::metrics::{record_in_progress, record_job};

/// A job transition reported by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    PageFetched { jobs: usize },
    Started { job_id: JobId },
    Skipped { job_id: JobId, elapsed: Duration },
    Succeeded { job_id: JobId, images: usize, elapsed: Duration },
    Deferred { job_id: JobId },
    TransientFailure { job_id: JobId, elapsed: Duration },
    PermanentFailure { job_id: JobId, elapsed: Duration },
    VideoGenerated { job_id: JobId },
    VideoFailed { job_id: JobId },
}

#[derive(Debug, Default)]
struct ProgressState {
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    pages: u64,
    in_progress: usize,
    processed: u64,
    succeeded: u64,
    skipped: u64,
    failed: u64,
    transient_failures: u64,
    permanent_failures: u64,
    deferred: u64,
    images: u64,
    videos: u64,
    video_failures: u64,
}

/// Point-in-time view of run progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub running: bool,
    pub pages: u64,
    pub in_progress: usize,
    /// Jobs that reached an outcome, deferrals excluded.
    pub processed: u64,
    /// Includes skipped jobs.
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub deferred: u64,
    pub images: u64,
    pub videos: u64,
    pub video_failures: u64,
    pub elapsed_ms: u64,
    /// Percent of processed jobs that succeeded.
    pub success_rate: f64,
    pub jobs_per_minute: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run as started. Resets nothing; build a new tracker per run.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.started_at = Some(Instant::now());
        state.finished_at = None;
    }

    pub fn finish(&self) {
        self.state.lock().finished_at = Some(Instant::now());
    }

    pub fn record(&self, event: ProgressEvent) {
        let mut state = self.state.lock();
        match event {
            ProgressEvent::PageFetched { .. } => state.pages += 1,
            ProgressEvent::Started { .. } => {
                state.in_progress += 1;
                record_in_progress(state.in_progress);
            }
            ProgressEvent::Skipped { elapsed, .. } => {
                state.processed += 1;
                state.succeeded += 1;
                state.skipped += 1;
                record_job("skipped", elapsed);
            }
            ProgressEvent::Succeeded {
                images, elapsed, ..
            } => {
                state.finish_job();
                state.processed += 1;
                state.succeeded += 1;
                state.images += images as u64;
                record_job("succeeded", elapsed);
            }
            ProgressEvent::Deferred { .. } => {
                state.deferred += 1;
                record_job("deferred", Duration::ZERO);
            }
            ProgressEvent::TransientFailure { elapsed, .. } => {
                state.finish_job();
                state.processed += 1;
                state.failed += 1;
                state.transient_failures += 1;
                record_job("transient_failure", elapsed);
            }
            ProgressEvent::PermanentFailure { elapsed, .. } => {
                state.finish_job();
                state.processed += 1;
                state.failed += 1;
                state.permanent_failures += 1;
                record_job("permanent_failure", elapsed);
            }
            ProgressEvent::VideoGenerated { .. } => state.videos += 1,
            ProgressEvent::VideoFailed { .. } => state.video_failures += 1,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock();
        let elapsed = match (state.started_at, state.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };

        let success_rate = if state.processed > 0 {
            state.succeeded as f64 / state.processed as f64 * 100.0
        } else {
            0.0
        };
        let minutes = elapsed.as_secs_f64() / 60.0;
        let jobs_per_minute = if minutes > 0.0 {
            state.processed as f64 / minutes
        } else {
            0.0
        };

        ProgressSnapshot {
            running: state.started_at.is_some() && state.finished_at.is_none(),
            pages: state.pages,
            in_progress: state.in_progress,
            processed: state.processed,
            succeeded: state.succeeded,
            skipped: state.skipped,
            failed: state.failed,
            transient_failures: state.transient_failures,
            permanent_failures: state.permanent_failures,
            deferred: state.deferred,
            images: state.images,
            videos: state.videos,
            video_failures: state.video_failures,
            elapsed_ms: elapsed.as_millis() as u64,
            success_rate,
            jobs_per_minute,
        }
    }
}

impl ProgressState {
    fn finish_job(&mut self) {
        self.in_progress = self.in_progress.saturating_sub(1);
        record_in_progress(self.in_progress);
    }
}
