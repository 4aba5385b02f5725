//! Scripted in-process collaborators for pipeline and driver tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use gbatch_models::{Job, RunConfig};
use gbatch_providers::{
    ArtifactSink, FetchedImage, GenerationProvider, GenerationRequest, InMemoryJobStore,
    ProviderError, ProviderResult, VideoRequest, VisionProvider,
};
use gbatch_worker::{ProgressTracker, ProviderFactory, RunContext, WorkerConfig, WorkerResult};

/// Generation provider replaying scripted responses, then a default.
#[derive(Default)]
pub struct ScriptedGeneration {
    images: Mutex<VecDeque<ProviderResult<Vec<String>>>>,
    videos: Mutex<VecDeque<ProviderResult<String>>>,
    /// Returned once the image script is exhausted; `None` means success.
    fallback_error: Mutex<Option<ProviderError>>,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<(Instant, GenerationRequest)>>,
    video_calls: Mutex<Vec<(Instant, VideoRequest)>>,
    uploads: Mutex<Vec<FetchedImage>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGeneration {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_image(&self, result: ProviderResult<Vec<String>>) {
        self.images.lock().push_back(result);
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push_image(Err(ProviderError::from_status(status, body)));
    }

    pub fn push_video(&self, result: ProviderResult<String>) {
        self.videos.lock().push_back(result);
    }

    pub fn fail_always(&self, error: ProviderError) {
        *self.fallback_error.lock() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn video_call_times(&self) -> Vec<Instant> {
        self.video_calls.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn video_requests(&self) -> Vec<VideoRequest> {
        self.video_calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGeneration {
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Vec<String>> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push((Instant::now(), request.clone()));
            calls.len()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(scripted) = self.images.lock().pop_front() {
            return scripted;
        }
        if let Some(error) = self.fallback_error.lock().clone() {
            return Err(error);
        }
        Ok((0..request.count)
            .map(|i| format!("https://cdn.test/gen/{}_{}.png", index, i))
            .collect())
    }

    async fn generate_video(&self, request: &VideoRequest) -> ProviderResult<String> {
        self.video_calls
            .lock()
            .push((Instant::now(), request.clone()));
        self.videos
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("https://cdn.test/video.mp4".to_string()))
    }

    async fn upload_reference(&self, image: &FetchedImage) -> ProviderResult<String> {
        let mut uploads = self.uploads.lock();
        uploads.push(image.clone());
        Ok(format!("https://cdn.test/uploads/{}.png", uploads.len()))
    }
}

/// Vision provider answering with a fixed description.
pub struct FixedVision {
    pub description: String,
    pub calls: Mutex<Vec<(Vec<u8>, String)>>,
}

impl FixedVision {
    pub fn new(description: &str) -> Arc<Self> {
        Arc::new(Self {
            description: description.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl VisionProvider for FixedVision {
    async fn analyze(&self, image: &[u8], mime_type: &str, _prompt: &str) -> ProviderResult<String> {
        self.calls
            .lock()
            .push((image.to_vec(), mime_type.to_string()));
        Ok(self.description.clone())
    }
}

/// Artifact sink that records destinations without touching the network.
#[derive(Default)]
pub struct RecordingSink {
    pub downloads: Mutex<Vec<(String, PathBuf)>>,
    pub fetches: Mutex<Vec<String>>,
    fail_downloads: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        *sink.fail_downloads.lock() = true;
        Arc::new(sink)
    }

    pub fn downloaded(&self) -> Vec<(String, PathBuf)> {
        self.downloads.lock().clone()
    }
}

#[async_trait]
impl ArtifactSink for RecordingSink {
    async fn download(&self, url: &str, destination: &Path) -> ProviderResult<()> {
        if *self.fail_downloads.lock() {
            return Err(ProviderError::from_status(404, "gone"));
        }
        self.downloads
            .lock()
            .push((url.to_string(), destination.to_path_buf()));
        Ok(())
    }

    async fn fetch(&self, url: &str) -> ProviderResult<FetchedImage> {
        self.fetches.lock().push(url.to_string());
        Ok(FetchedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".to_string(),
        })
    }
}

/// Hands out the same fakes on every run.
pub struct FakeFactory {
    pub generation: Arc<ScriptedGeneration>,
    pub vision: Option<Arc<FixedVision>>,
    pub sink: Arc<RecordingSink>,
}

impl FakeFactory {
    pub fn new(generation: Arc<ScriptedGeneration>) -> Self {
        Self {
            generation,
            vision: None,
            sink: RecordingSink::new(),
        }
    }

    pub fn with_vision(mut self, vision: Arc<FixedVision>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_sink(mut self, sink: Arc<RecordingSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl ProviderFactory for FakeFactory {
    fn generation(&self, _run_config: &RunConfig) -> WorkerResult<Arc<dyn GenerationProvider>> {
        Ok(self.generation.clone())
    }

    fn vision(&self, _run_config: &RunConfig) -> WorkerResult<Option<Arc<dyn VisionProvider>>> {
        Ok(self
            .vision
            .clone()
            .map(|v| v as Arc<dyn VisionProvider>))
    }

    fn sink(&self) -> WorkerResult<Arc<dyn ArtifactSink>> {
        Ok(self.sink.clone())
    }
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        output_dir: PathBuf::from("/tmp/gbatch-test-output"),
        ..Default::default()
    }
}

pub fn store_with(run_config: RunConfig, jobs: Vec<Job>) -> Arc<InMemoryJobStore> {
    Arc::new(InMemoryJobStore::new(Some(run_config), jobs))
}

/// Run context over an in-memory store and the given fakes.
pub fn context(
    config: WorkerConfig,
    run_config: RunConfig,
    store: Arc<InMemoryJobStore>,
    factory: &FakeFactory,
) -> Arc<RunContext> {
    Arc::new(
        RunContext::new(config, run_config, store, factory, ProgressTracker::new())
            .expect("fake factory never fails"),
    )
}

pub fn millis_between(a: Instant, b: Instant) -> u128 {
    b.saturating_duration_since(a).as_millis()
}
