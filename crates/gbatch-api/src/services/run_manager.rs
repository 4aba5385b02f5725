//! Single-flight ownership of batch runs.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn, Instrument};

use gbatch_providers::JobStore;
use gbatch_worker::{
    BatchDriver, LimiterStats, ProgressSnapshot, ProviderFactory, RunSummary, WorkerConfig,
    WorkerResult,
};

use crate::error::{ApiError, ApiResult};

/// Reply to a successful trigger.
#[derive(Debug, Clone, Serialize)]
pub struct RunStarted {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
}

/// Outcome of the most recent completed run.
#[derive(Debug, Clone, Serialize)]
pub struct FinishedRun {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    /// Set when the run ended on a fatal error.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub run_id: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub progress: Option<ProgressSnapshot>,
    pub limits: Option<LimiterStats>,
    pub last_run: Option<FinishedRun>,
}

struct ActiveRun {
    run_id: u64,
    started_at: DateTime<Utc>,
    driver: Arc<BatchDriver>,
}

#[derive(Default)]
struct Slots {
    active: Option<ActiveRun>,
    last: Option<FinishedRun>,
    runs_started: u64,
}

/// Starts runs in the background and reports on them. At most one run is
/// active at a time.
pub struct RunManager {
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    factory: Arc<dyn ProviderFactory>,
    slots: Mutex<Slots>,
}

impl RunManager {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config,
            store,
            factory,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn is_running(&self) -> bool {
        self.slots.lock().active.is_some()
    }

    /// Spawn a new run, or fail with `Conflict` while one is in flight.
    pub fn start(self: &Arc<Self>) -> ApiResult<RunStarted> {
        let (run_id, started_at, driver) = {
            let mut slots = self.slots.lock();
            if let Some(active) = &slots.active {
                return Err(ApiError::conflict(format!(
                    "run {} is already in progress",
                    active.run_id
                )));
            }

            slots.runs_started += 1;
            let run_id = slots.runs_started;
            let started_at = Utc::now();
            let driver = Arc::new(BatchDriver::new(
                self.config.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.factory),
            ));
            slots.active = Some(ActiveRun {
                run_id,
                started_at,
                driver: Arc::clone(&driver),
            });
            (run_id, started_at, driver)
        };

        info!(run_id, "Run triggered");

        let manager = Arc::clone(self);
        let span = tracing::info_span!("batch_run", run_id);
        tokio::spawn(
            async move {
                let result = driver.run().await;
                manager.complete(run_id, result, driver.summary());
            }
            .instrument(span),
        );

        Ok(RunStarted { run_id, started_at })
    }

    fn complete(&self, run_id: u64, result: WorkerResult<RunSummary>, fallback: RunSummary) {
        let mut slots = self.slots.lock();
        let started_at = match slots.active.take() {
            Some(active) if active.run_id == run_id => active.started_at,
            other => {
                slots.active = other;
                warn!(run_id, "Completed run was not the active one");
                return;
            }
        };

        let (summary, error) = match result {
            Ok(summary) => (summary, None),
            Err(e) => {
                warn!(run_id, error = %e, "Run ended with a fatal error");
                (fallback, Some(e.to_string()))
            }
        };

        slots.last = Some(FinishedRun {
            run_id,
            started_at,
            finished_at: Utc::now(),
            summary,
            error,
        });
    }

    pub fn status(&self) -> RunStatus {
        let slots = self.slots.lock();
        match &slots.active {
            Some(active) => RunStatus {
                running: true,
                run_id: Some(active.run_id),
                started_at: Some(active.started_at),
                progress: Some(active.driver.progress().snapshot()),
                limits: active.driver.limiter_stats(),
                last_run: slots.last.clone(),
            },
            None => RunStatus {
                running: false,
                run_id: None,
                started_at: None,
                progress: None,
                limits: None,
                last_run: slots.last.clone(),
            },
        }
    }
}
