//! Per-run state shared by every pipeline invocation.

use std::sync::Arc;

use serde::Serialize;

use gbatch_limits::{
    BreakerStats, CircuitBreaker, ConcurrencyLimiter, ConcurrencyStats, RateLimiter,
    RateLimiterStats, UploadLimiter, UploadStats,
};
use gbatch_models::RunConfig;
use gbatch_providers::{
    ArtifactSink, GeminiVisionClient, GeminiVisionConfig, GenerationProvider, HttpArtifactSink,
    HttpGenerationClient, JobStore, VisionProvider,
};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::progress::ProgressTracker;

/// Builds provider clients once the run configuration (and its
/// credentials) has been loaded.
pub trait ProviderFactory: Send + Sync {
    fn generation(&self, run_config: &RunConfig) -> WorkerResult<Arc<dyn GenerationProvider>>;

    /// `None` when no vision credentials are configured.
    fn vision(&self, run_config: &RunConfig) -> WorkerResult<Option<Arc<dyn VisionProvider>>>;

    fn sink(&self) -> WorkerResult<Arc<dyn ArtifactSink>>;
}

/// Factory for the production HTTP clients.
#[derive(Debug, Clone)]
pub struct HttpProviderFactory {
    config: WorkerConfig,
}

impl HttpProviderFactory {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn generation(&self, run_config: &RunConfig) -> WorkerResult<Arc<dyn GenerationProvider>> {
        let http = self
            .config
            .generation_client(&run_config.credentials.generation_api_key);
        Ok(Arc::new(HttpGenerationClient::new(http)?))
    }

    fn vision(&self, run_config: &RunConfig) -> WorkerResult<Option<Arc<dyn VisionProvider>>> {
        match run_config.credentials.vision_api_key.as_deref() {
            Some(key) if run_config.vision_enabled() => {
                let vision = GeminiVisionConfig::new(key).with_model(&self.config.vision_model);
                Ok(Some(Arc::new(GeminiVisionClient::new(vision)?)))
            }
            _ => Ok(None),
        }
    }

    fn sink(&self) -> WorkerResult<Arc<dyn ArtifactSink>> {
        Ok(Arc::new(HttpArtifactSink::new(self.config.download_timeout)?))
    }
}

/// Limiter and breaker counters for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub vision_rate: RateLimiterStats,
    pub jobs: ConcurrencyStats,
    pub uploads: UploadStats,
    pub breaker: BreakerStats,
}

/// Everything one run needs. Built fresh at run start so no limiter or
/// breaker state carries over between runs.
pub struct RunContext {
    pub config: WorkerConfig,
    pub run_config: RunConfig,
    pub store: Arc<dyn JobStore>,
    pub generation: Arc<dyn GenerationProvider>,
    pub vision: Option<Arc<dyn VisionProvider>>,
    pub sink: Arc<dyn ArtifactSink>,
    pub rate_limiter: RateLimiter,
    pub concurrency: ConcurrencyLimiter,
    pub uploads: UploadLimiter,
    pub breaker: CircuitBreaker,
    pub progress: ProgressTracker,
}

impl RunContext {
    pub fn new(
        config: WorkerConfig,
        run_config: RunConfig,
        store: Arc<dyn JobStore>,
        factory: &dyn ProviderFactory,
        progress: ProgressTracker,
    ) -> WorkerResult<Self> {
        let generation = factory.generation(&run_config)?;
        let vision = factory.vision(&run_config)?;
        let sink = factory.sink()?;

        Ok(Self {
            rate_limiter: RateLimiter::new("vision", config.vision_rate_per_minute),
            concurrency: ConcurrencyLimiter::new("jobs", config.max_concurrent_jobs),
            uploads: UploadLimiter::new(config.upload_limiter()),
            breaker: CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown),
            config,
            run_config,
            store,
            generation,
            vision,
            sink,
            progress,
        })
    }

    pub fn limiter_stats(&self) -> LimiterStats {
        LimiterStats {
            vision_rate: self.rate_limiter.stats(),
            jobs: self.concurrency.stats(),
            uploads: self.uploads.stats(),
            breaker: self.breaker.stats(),
        }
    }
}
