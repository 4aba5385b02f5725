//! Collaborator contracts consumed by the worker.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;

use gbatch_models::{ImageSize, Job, JobId, JobUpdate, RunConfig, VideoDuration};

use crate::error::ProviderResult;

/// Which jobs count as pending for a page scan.
#[derive(Debug, Clone, Default)]
pub struct PendingFilter {
    /// Jobs already attempted in the current run.
    pub exclude: HashSet<JobId>,
    /// Include jobs that carry a persisted error.
    pub include_errored: bool,
}

impl PendingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = JobId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    pub fn include_errored(mut self, include: bool) -> Self {
        self.include_errored = include;
        self
    }

    /// True if the job still lacks output and passes the filter.
    pub fn matches(&self, job: &Job) -> bool {
        !job.has_artifacts()
            && (self.include_errored || job.error.is_none())
            && !self.exclude.contains(&job.id)
    }
}

/// Durable job state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Up to `max_count` jobs matching `filter`, in store order.
    async fn list_pending_jobs(
        &self,
        filter: &PendingFilter,
        max_count: usize,
    ) -> ProviderResult<Vec<Job>>;

    /// Partial update of one job.
    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> ProviderResult<()>;

    /// The run configuration record, read once per run.
    async fn load_run_config(&self) -> ProviderResult<RunConfig>;
}

/// Image generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<String>,
    pub count: u8,
    pub size: ImageSize,
    pub enable_safety_checker: bool,
}

/// Video generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub source_image_url: String,
    pub prompt: String,
    pub duration: VideoDuration,
    pub style: Option<String>,
}

/// Image bytes fetched from a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Media generation provider.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate images; returns artifact URLs.
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Vec<String>>;

    /// Generate a video from a source image; returns the video URL.
    async fn generate_video(&self, request: &VideoRequest) -> ProviderResult<String>;

    /// Upload a reference image; returns a URL the provider can read.
    async fn upload_reference(&self, image: &FetchedImage) -> ProviderResult<String>;
}

/// Vision analysis provider.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Describe an image according to `prompt`.
    async fn analyze(&self, image: &[u8], mime_type: &str, prompt: &str) -> ProviderResult<String>;
}

/// Local artifact storage.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Download `url` to `destination`.
    async fn download(&self, url: &str, destination: &Path) -> ProviderResult<()>;

    /// Fetch an image into memory.
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedImage>;
}
