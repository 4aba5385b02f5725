//! Job store implementations.

mod file;
mod memory;

pub use file::JsonFileJobStore;
pub use memory::InMemoryJobStore;

use serde::{Deserialize, Serialize};

use gbatch_models::{Job, JobId, JobUpdate, RunConfig};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::PendingFilter;

/// Persisted layout shared by the stores: the run configuration record and
/// the job table in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RunConfig>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl StoreDocument {
    pub fn new(config: Option<RunConfig>, jobs: Vec<Job>) -> Self {
        Self { config, jobs }
    }

    pub(crate) fn pending(&self, filter: &PendingFilter, max_count: usize) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|job| filter.matches(job))
            .take(max_count)
            .cloned()
            .collect()
    }

    pub(crate) fn apply(&mut self, id: &JobId, update: &JobUpdate) -> ProviderResult<()> {
        let job = self
            .jobs
            .iter_mut()
            .find(|job| &job.id == id)
            .ok_or_else(|| ProviderError::validation(format!("unknown job: {}", id)))?;
        update.apply_to(job);
        Ok(())
    }

    pub(crate) fn run_config(&self) -> ProviderResult<RunConfig> {
        self.config
            .clone()
            .ok_or_else(|| ProviderError::config("run configuration record missing"))
    }
}
