//! Batch driver: pages the job store and fans each page out through the
//! concurrency gate until the backlog is drained.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info};

use gbatch_models::JobId;
use gbatch_providers::{JobStore, PendingFilter};

use crate::config::WorkerConfig;
use crate::context::{LimiterStats, ProviderFactory, RunContext};
use crate::error::WorkerResult;
use crate::metrics::record_run;
use crate::pipeline::JobPipeline;
use crate::progress::{ProgressEvent, ProgressSnapshot, ProgressTracker};

/// End-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub progress: ProgressSnapshot,
    /// Absent when the run failed before its context was built.
    pub limits: Option<LimiterStats>,
}

impl RunSummary {
    pub fn log(&self) {
        let p = &self.progress;
        info!(
            processed = p.processed,
            succeeded = p.succeeded,
            failed = p.failed,
            transient = p.transient_failures,
            permanent = p.permanent_failures,
            deferred = p.deferred,
            skipped = p.skipped,
            images = p.images,
            videos = p.videos,
            success_rate = p.success_rate,
            jobs_per_minute = p.jobs_per_minute,
            duration_ms = p.elapsed_ms,
            "Run summary"
        );
        if let Some(limits) = &self.limits {
            info!(
                vision_requests = limits.vision_rate.total_requests,
                vision_avg_wait_ms = limits.vision_rate.average_wait_ms,
                breaker_trips = limits.breaker.total_breaks,
                upload_avg_ms = limits.uploads.average_duration_ms,
                upload_limit = limits.uploads.limit,
                upload_slow = limits.uploads.slow_connection_detected,
                "Run limiter stats"
            );
        }
    }
}

/// Drives one run. Build a new driver for every run.
pub struct BatchDriver {
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    factory: Arc<dyn ProviderFactory>,
    progress: ProgressTracker,
    context: Mutex<Option<Arc<RunContext>>>,
}

impl BatchDriver {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config,
            store,
            factory,
            progress: ProgressTracker::new(),
            context: Mutex::new(None),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Live limiter counters once the run context exists.
    pub fn limiter_stats(&self) -> Option<LimiterStats> {
        self.context.lock().as_ref().map(|ctx| ctx.limiter_stats())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            progress: self.progress.snapshot(),
            limits: self.limiter_stats(),
        }
    }

    /// Run until no pending jobs remain. Only a failed configuration load or
    /// page fetch ends the run early; the summary is logged either way.
    pub async fn run(&self) -> WorkerResult<RunSummary> {
        let started = Instant::now();
        self.progress.start();
        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            page_size = self.config.page_size,
            "Run started"
        );

        let result = self.drain().await;

        self.progress.finish();
        record_run(started.elapsed());
        let summary = self.summary();
        summary.log();

        match result {
            Ok(()) => Ok(summary),
            Err(e) => {
                error!(error = %e, "Run aborted");
                Err(e)
            }
        }
    }

    async fn drain(&self) -> WorkerResult<()> {
        let run_config = self.store.load_run_config().await?;
        run_config.check()?;

        let ctx = Arc::new(RunContext::new(
            self.config.clone(),
            run_config,
            self.store.clone(),
            self.factory.as_ref(),
            self.progress.clone(),
        )?);
        *self.context.lock() = Some(ctx.clone());

        let pipeline = JobPipeline::new(ctx.clone());
        let page_size = self.config.page_size.max(1);
        let mut attempted: HashSet<JobId> = HashSet::new();

        loop {
            let filter = PendingFilter::new().excluding(attempted.iter().cloned());
            let page = self.store.list_pending_jobs(&filter, page_size).await?;
            let fetched = page.len();
            self.progress.record(ProgressEvent::PageFetched { jobs: fetched });
            info!(jobs = fetched, "Fetched page");

            if fetched == 0 {
                break;
            }
            attempted.extend(page.iter().map(|job| job.id.clone()));

            let tasks = page.into_iter().map(|job| {
                let pipeline = &pipeline;
                let gate = &ctx.concurrency;
                async move { gate.run(pipeline.run(job)).await }
            });
            let outcomes = join_all(tasks).await;

            let failures = outcomes.iter().filter(|o| o.is_failure()).count();
            info!(
                jobs = outcomes.len(),
                failures = failures,
                "Page complete"
            );

            if fetched < page_size {
                break;
            }
        }

        Ok(())
    }
}
