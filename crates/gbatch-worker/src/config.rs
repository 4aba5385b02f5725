//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gbatch_limits::UploadLimiterConfig;
use gbatch_providers::HttpGenerationConfig;

/// Default instruction sent with reference images to the vision model.
pub const DEFAULT_VISION_PROMPT: &str = "Describe this image in detail as a prompt for an image \
generation model. Cover the subject, composition, lighting, colors and style. \
Answer with the prompt text only.";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs in flight; the generation provider's hard limit
    pub max_concurrent_jobs: usize,
    /// Jobs fetched per page
    pub page_size: usize,
    /// Vision analysis calls per minute
    pub vision_rate_per_minute: u32,
    /// Initial reference upload concurrency
    pub upload_concurrency: usize,
    /// Upload concurrency while the connection is slow
    pub upload_fallback_concurrency: usize,
    /// Upload timeout before enough samples exist
    pub upload_base_timeout: Duration,
    /// Deadline for each generation or video call
    pub call_timeout: Duration,
    /// Timeout for artifact downloads and reference fetches
    pub download_timeout: Duration,
    /// Consecutive permanent failures before the breaker opens
    pub breaker_threshold: u32,
    /// How long the breaker stays open after the last failure
    pub breaker_cooldown: Duration,
    /// Directory artifacts are downloaded to, one subdirectory per job
    pub output_dir: PathBuf,
    /// JSON job store used by the CLI binary
    pub store_path: PathBuf,
    pub generation_base_url: String,
    pub image_model: String,
    pub video_model: String,
    pub vision_model: String,
    pub vision_prompt: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let http = HttpGenerationConfig::default();
        Self {
            max_concurrent_jobs: 4,
            page_size: 20,
            vision_rate_per_minute: 10,
            upload_concurrency: 3,
            upload_fallback_concurrency: 2,
            upload_base_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(300),
            download_timeout: Duration::from_secs(120),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(60),
            output_dir: PathBuf::from("./output"),
            store_path: PathBuf::from("./jobs.json"),
            generation_base_url: http.base_url,
            image_model: http.image_model,
            video_model: http.video_model,
            vision_model: "gemini-2.5-flash".to_string(),
            vision_prompt: DEFAULT_VISION_PROMPT.to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_or("GBATCH_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            page_size: env_or("GBATCH_PAGE_SIZE", defaults.page_size),
            vision_rate_per_minute: env_or(
                "GBATCH_VISION_RATE_PER_MINUTE",
                defaults.vision_rate_per_minute,
            ),
            upload_concurrency: env_or("GBATCH_UPLOAD_CONCURRENCY", defaults.upload_concurrency),
            upload_fallback_concurrency: env_or(
                "GBATCH_UPLOAD_FALLBACK_CONCURRENCY",
                defaults.upload_fallback_concurrency,
            ),
            upload_base_timeout: Duration::from_secs(env_or("GBATCH_UPLOAD_TIMEOUT_SECS", 30)),
            call_timeout: Duration::from_secs(env_or("GBATCH_CALL_TIMEOUT_SECS", 300)),
            download_timeout: Duration::from_secs(env_or("GBATCH_DOWNLOAD_TIMEOUT_SECS", 120)),
            breaker_threshold: env_or("GBATCH_BREAKER_THRESHOLD", defaults.breaker_threshold),
            breaker_cooldown: Duration::from_secs(env_or("GBATCH_BREAKER_COOLDOWN_SECS", 60)),
            output_dir: std::env::var("GBATCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            store_path: std::env::var("GBATCH_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            generation_base_url: std::env::var("GBATCH_GENERATION_URL")
                .unwrap_or(defaults.generation_base_url),
            image_model: std::env::var("GBATCH_IMAGE_MODEL").unwrap_or(defaults.image_model),
            video_model: std::env::var("GBATCH_VIDEO_MODEL").unwrap_or(defaults.video_model),
            vision_model: std::env::var("GBATCH_VISION_MODEL").unwrap_or(defaults.vision_model),
            vision_prompt: std::env::var("GBATCH_VISION_PROMPT").unwrap_or(defaults.vision_prompt),
        }
    }

    /// Generation client settings; the key comes from the run configuration.
    pub fn generation_client(&self, api_key: impl Into<String>) -> HttpGenerationConfig {
        HttpGenerationConfig {
            base_url: self.generation_base_url.clone(),
            image_model: self.image_model.clone(),
            video_model: self.video_model.clone(),
            api_key: api_key.into(),
            timeout: self.call_timeout,
        }
    }

    /// Upload limiter settings derived from this config.
    pub fn upload_limiter(&self) -> UploadLimiterConfig {
        UploadLimiterConfig {
            concurrency: self.upload_concurrency,
            fallback_concurrency: self.upload_fallback_concurrency,
            base_timeout: self.upload_base_timeout,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.call_timeout, Duration::from_secs(300));
        assert_eq!(config.breaker_threshold, 5);
    }

    #[test]
    fn test_upload_limiter_keeps_adaptive_defaults() {
        let config = WorkerConfig {
            upload_concurrency: 5,
            ..Default::default()
        };
        let upload = config.upload_limiter();
        assert_eq!(upload.concurrency, 5);
        assert_eq!(upload.fallback_concurrency, 2);
        assert_eq!(upload.max_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_generation_client_follows_worker_config() {
        let config = WorkerConfig {
            generation_base_url: "http://localhost:9000".to_string(),
            image_model: "img".to_string(),
            call_timeout: Duration::from_secs(45),
            ..Default::default()
        };
        let http = config.generation_client("key-1");
        assert_eq!(http.base_url, "http://localhost:9000");
        assert_eq!(http.image_model, "img");
        assert_eq!(http.video_model, WorkerConfig::default().video_model);
        assert_eq!(http.api_key, "key-1");
        assert_eq!(http.timeout, Duration::from_secs(45));
    }
}
