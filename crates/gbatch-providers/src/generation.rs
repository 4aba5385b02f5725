//! HTTP client for the media generation provider.
//!
//! Image and video endpoints take a JSON body and answer synchronously with
//! artifact URLs. Reference images are uploaded as raw bytes first.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::http::check_response;
use crate::traits::{FetchedImage, GenerationProvider, GenerationRequest, VideoRequest};

const PROVIDER: &str = "generation";

/// Configuration for the generation client.
#[derive(Debug, Clone)]
pub struct HttpGenerationConfig {
    /// Base URL of the provider API
    pub base_url: String,
    /// Image model path, appended to the base URL
    pub image_model: String,
    /// Video model path, appended to the base URL
    pub video_model: String,
    /// API key, sent as `Authorization: Key <key>`
    pub api_key: String,
    /// HTTP client timeout
    pub timeout: Duration,
}

impl Default for HttpGenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fal.run".to_string(),
            image_model: "fal-ai/flux-pulid".to_string(),
            video_model: "fal-ai/kling-video/v1.6/standard/image-to-video".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(300), // Generation can take minutes
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageBody<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    image_urls: &'a [String],
    num_images: u8,
    image_size: &'a str,
    enable_safety_checker: bool,
}

#[derive(Debug, Serialize)]
struct VideoBody<'a> {
    prompt: &'a str,
    image_url: &'a str,
    duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    images: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    video: Option<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Generation provider over HTTP.
pub struct HttpGenerationClient {
    http: Client,
    config: HttpGenerationConfig,
}

impl HttpGenerationClient {
    pub fn new(config: HttpGenerationConfig) -> ProviderResult<Self> {
        if config.api_key.is_empty() {
            return Err(ProviderError::config("generation API key not set"));
        }
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn auth(&self) -> String {
        format!("Key {}", self.config.api_key)
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Vec<String>> {
        let body = ImageBody {
            prompt: &request.prompt,
            image_urls: &request.reference_images,
            num_images: request.count,
            image_size: request.size.as_str(),
            enable_safety_checker: request.enable_safety_checker,
        };

        debug!(
            references = request.reference_images.len(),
            count = request.count,
            "Submitting image generation"
        );

        let started = Instant::now();
        let response = self
            .http
            .post(self.url(&self.config.image_model))
            .header(AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        let response = check_response(PROVIDER, "generate", started, response).await?;

        let parsed: ImageResponse = response.json().await?;
        if parsed.images.is_empty() {
            return Err(ProviderError::validation("provider returned no images"));
        }

        info!(images = parsed.images.len(), "Image generation complete");
        Ok(parsed.images.into_iter().map(|a| a.url).collect())
    }

    async fn generate_video(&self, request: &VideoRequest) -> ProviderResult<String> {
        let body = VideoBody {
            prompt: &request.prompt,
            image_url: &request.source_image_url,
            duration: request.duration.seconds().to_string(),
            style: request.style.as_deref(),
        };

        let started = Instant::now();
        let response = self
            .http
            .post(self.url(&self.config.video_model))
            .header(AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        let response = check_response(PROVIDER, "generate_video", started, response).await?;

        let parsed: VideoResponse = response.json().await?;
        parsed
            .video
            .map(|v| v.url)
            .ok_or_else(|| ProviderError::validation("provider returned no video"))
    }

    async fn upload_reference(&self, image: &FetchedImage) -> ProviderResult<String> {
        let started = Instant::now();
        let response = self
            .http
            .post(self.url("storage/upload"))
            .header(AUTHORIZATION, self.auth())
            .header(CONTENT_TYPE, image.mime_type.as_str())
            .body(image.bytes.clone())
            .send()
            .await?;
        let response = check_response(PROVIDER, "upload", started, response).await?;

        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.url)
    }
}
