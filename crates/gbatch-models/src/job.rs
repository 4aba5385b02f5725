//! Job records as read from and written back to the job store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a job record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single generation job.
///
/// Lives in the external store; the pipeline mutates its local copy as
/// it advances and persists the relevant fields through [`JobUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Prompt text. Replaced by the vision description when a reference
    /// image is analyzed.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,
    /// URL of an attached reference image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    /// Generated artifact URLs. Non-empty means the job is done.
    #[serde(default)]
    pub generated_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job with only a prompt.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: JobId::from_string(id),
            prompt: prompt.into(),
            video_prompt: None,
            reference_image: None,
            generated_urls: Vec::new(),
            video_url: None,
            error: None,
            updated_at: None,
        }
    }

    pub fn with_reference_image(mut self, url: impl Into<String>) -> Self {
        self.reference_image = Some(url.into());
        self
    }

    pub fn with_video_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.video_prompt = Some(prompt.into());
        self
    }

    pub fn with_generated_urls(mut self, urls: Vec<String>) -> Self {
        self.generated_urls = urls;
        self
    }

    /// True if generation output already exists.
    pub fn has_artifacts(&self) -> bool {
        !self.generated_urls.is_empty()
    }

    /// Prompt used for video generation, falling back to the image prompt.
    pub fn effective_video_prompt(&self) -> &str {
        self.video_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.prompt)
    }
}

/// Change applied to the job's error field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum ErrorUpdate {
    Set(String),
    Clear,
}

/// Partial update of a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorUpdate>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn generated_urls(mut self, urls: Vec<String>) -> Self {
        self.generated_urls = Some(urls);
        self
    }

    pub fn video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    pub fn set_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(ErrorUpdate::Set(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(ErrorUpdate::Clear);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prompt.is_none()
            && self.generated_urls.is_none()
            && self.video_url.is_none()
            && self.error.is_none()
    }

    /// Apply this update to a job record in place.
    pub fn apply_to(&self, job: &mut Job) {
        if let Some(prompt) = &self.prompt {
            job.prompt = prompt.clone();
        }
        if let Some(urls) = &self.generated_urls {
            job.generated_urls = urls.clone();
        }
        if let Some(url) = &self.video_url {
            job.video_url = Some(url.clone());
        }
        match &self.error {
            Some(ErrorUpdate::Set(msg)) => job.error = Some(msg.clone()),
            Some(ErrorUpdate::Clear) => job.error = None,
            None => {}
        }
        job.updated_at = Some(Utc::now());
    }
}
