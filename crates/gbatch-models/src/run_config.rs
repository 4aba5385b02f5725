//! Per-run configuration record.
//!
//! Read once from the job store at run start. Concurrency limits are NOT
//! part of this record; they are fixed provider limits owned by the worker.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Errors raised while validating a run configuration.
#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("Invalid run configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Invalid video duration: {0} (expected 5 or 10)")]
    InvalidDuration(u8),
}

/// Provider credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, message = "generation API key must not be empty"))]
    pub generation_api_key: String,
    /// Vision analysis is disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_api_key: Option<String>,
}

/// Output image size preset understood by the generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageSize {
    #[default]
    SquareHd,
    Square,
    #[serde(rename = "portrait_4_3")]
    Portrait4x3,
    #[serde(rename = "portrait_16_9")]
    Portrait16x9,
    #[serde(rename = "landscape_4_3")]
    Landscape4x3,
    #[serde(rename = "landscape_16_9")]
    Landscape16x9,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::SquareHd => "square_hd",
            ImageSize::Square => "square",
            ImageSize::Portrait4x3 => "portrait_4_3",
            ImageSize::Portrait16x9 => "portrait_16_9",
            ImageSize::Landscape4x3 => "landscape_4_3",
            ImageSize::Landscape16x9 => "landscape_16_9",
        }
    }
}

/// Video clip length. Only 5 and 10 seconds are accepted upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum VideoDuration {
    #[default]
    Five,
    Ten,
}

impl VideoDuration {
    pub fn seconds(&self) -> u8 {
        match self {
            VideoDuration::Five => 5,
            VideoDuration::Ten => 10,
        }
    }
}

impl TryFrom<u8> for VideoDuration {
    type Error = RunConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(VideoDuration::Five),
            10 => Ok(VideoDuration::Ten),
            other => Err(RunConfigError::InvalidDuration(other)),
        }
    }
}

impl From<VideoDuration> for u8 {
    fn from(d: VideoDuration) -> Self {
        d.seconds()
    }
}

fn default_image_count() -> u8 {
    1
}

/// Configuration shared by every job in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    #[validate(nested)]
    pub credentials: Credentials,
    #[serde(default)]
    pub enable_video: bool,
    /// Disables the provider's safety checker when true.
    #[serde(default)]
    pub enable_unsafe: bool,
    #[serde(default)]
    pub image_size: ImageSize,
    #[serde(default = "default_image_count")]
    #[validate(range(min = 1, max = 6, message = "image count must be between 1 and 6"))]
    pub image_count: u8,
    #[serde(default)]
    pub video_duration: VideoDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_style: Option<String>,
    /// Reference images attached to every generation request.
    #[serde(default)]
    #[validate(custom(function = "validate_reference_urls"))]
    pub reference_images: Vec<String>,
}

#[allow(clippy::ptr_arg)]
fn validate_reference_urls(urls: &Vec<String>) -> Result<(), ValidationError> {
    for url in urls {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            let mut err = ValidationError::new("reference_url");
            err.message = Some(format!("not an http(s) URL: {}", url).into());
            return Err(err);
        }
    }
    Ok(())
}

impl RunConfig {
    /// Minimal valid configuration with the given generation key.
    pub fn new(generation_api_key: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                generation_api_key: generation_api_key.into(),
                vision_api_key: None,
            },
            enable_video: false,
            enable_unsafe: false,
            image_size: ImageSize::default(),
            image_count: default_image_count(),
            video_duration: VideoDuration::default(),
            video_style: None,
            reference_images: Vec::new(),
        }
    }

    /// Validate field constraints.
    pub fn check(&self) -> Result<(), RunConfigError> {
        self.validate()?;
        Ok(())
    }

    pub fn vision_enabled(&self) -> bool {
        self.credentials
            .vision_api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }
}
