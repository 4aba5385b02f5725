use async_trait::async_trait;
use parking_lot::Mutex;

use gbatch_models::{Job, JobId, JobUpdate, RunConfig};

use super::StoreDocument;
use crate::error::ProviderResult;
use crate::traits::{JobStore, PendingFilter};

/// Job store held in memory. Records every update it receives.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    doc: StoreDocument,
    updates: Vec<(JobId, JobUpdate)>,
    list_calls: usize,
}

impl InMemoryJobStore {
    pub fn new(config: Option<RunConfig>, jobs: Vec<Job>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                doc: StoreDocument::new(config, jobs),
                ..Default::default()
            }),
        }
    }

    /// Current state of a job.
    pub fn job(&self, id: &str) -> Option<Job> {
        let inner = self.inner.lock();
        inner.doc.jobs.iter().find(|j| j.id.as_str() == id).cloned()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.inner.lock().doc.jobs.clone()
    }

    /// Updates received so far, in order.
    pub fn updates(&self) -> Vec<(JobId, JobUpdate)> {
        self.inner.lock().updates.clone()
    }

    /// Updates received for one job.
    pub fn updates_for(&self, id: &str) -> Vec<JobUpdate> {
        self.inner
            .lock()
            .updates
            .iter()
            .filter(|(job_id, _)| job_id.as_str() == id)
            .map(|(_, u)| u.clone())
            .collect()
    }

    /// Number of `list_pending_jobs` calls.
    pub fn list_calls(&self) -> usize {
        self.inner.lock().list_calls
    }

    pub fn snapshot(&self) -> StoreDocument {
        self.inner.lock().doc.clone()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn list_pending_jobs(
        &self,
        filter: &PendingFilter,
        max_count: usize,
    ) -> ProviderResult<Vec<Job>> {
        let mut inner = self.inner.lock();
        inner.list_calls += 1;
        Ok(inner.doc.pending(filter, max_count))
    }

    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> ProviderResult<()> {
        let mut inner = self.inner.lock();
        inner.doc.apply(id, update)?;
        inner.updates.push((id.clone(), update.clone()));
        Ok(())
    }

    async fn load_run_config(&self) -> ProviderResult<RunConfig> {
        self.inner.lock().doc.run_config()
    }
}
