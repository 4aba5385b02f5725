use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use gbatch_models::{Job, JobId, JobUpdate, RunConfig};

use super::StoreDocument;
use crate::error::ProviderResult;
use crate::traits::{JobStore, PendingFilter};

/// Job store backed by a single JSON document on disk.
///
/// Every update rewrites the whole document through a temporary file and a
/// rename, so a crash leaves either the old or the new contents.
pub struct JsonFileJobStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl JsonFileJobStore {
    /// Load the document at `path`. A missing file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store file missing, starting empty");
                StoreDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            jobs = doc.jobs.len(),
            "Opened job store"
        );
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Write `doc` to `path`, replacing any existing file.
    pub async fn create(path: impl AsRef<Path>, doc: StoreDocument) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        write_atomic(&path, &doc).await?;
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> StoreDocument {
        self.doc.lock().await.clone()
    }
}

async fn write_atomic(path: &Path, doc: &StoreDocument) -> ProviderResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn list_pending_jobs(
        &self,
        filter: &PendingFilter,
        max_count: usize,
    ) -> ProviderResult<Vec<Job>> {
        Ok(self.doc.lock().await.pending(filter, max_count))
    }

    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> ProviderResult<()> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        next.apply(id, update)?;
        write_atomic(&self.path, &next).await?;
        *doc = next;
        Ok(())
    }

    async fn load_run_config(&self) -> ProviderResult<RunConfig> {
        self.doc.lock().await.run_config()
    }
}
