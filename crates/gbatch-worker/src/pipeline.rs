//! Single-job generation pipeline.
//!
//! ```text
//! has artifacts ──────────────────────────────────────────▶ Skipped
//! breaker open ───────────────────────────────────────────▶ Deferred
//! reference + vision → analyze → persist prompt → upload
//!   → generate (retry) → download → persist urls
//!   → [video (retry) → persist url | persist video error] ─▶ Succeeded
//! any error: transient → untouched ───────────────────────▶ TransientFailure
//!            permanent → persist error, breaker failure ──▶ PermanentFailure
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, Instrument};

use gbatch_limits::UploadCallError;
use gbatch_models::{truncate_error, Job, JobUpdate, MAX_ERROR_LEN};
use gbatch_providers::{
    ErrorKind, FetchedImage, GenerationRequest, ProviderError, ProviderResult, VideoRequest,
};

use crate::context::RunContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::progress::ProgressEvent;
use crate::retry::{retry_async, RetryPolicy};

/// How a job left the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Artifacts already existed; nothing was called.
    Skipped,
    Succeeded {
        images: usize,
        video: bool,
    },
    /// Breaker open; no attempt made.
    Deferred,
    /// Left untouched in the store for a later run.
    TransientFailure { kind: ErrorKind, message: String },
    /// Error persisted on the job.
    PermanentFailure { kind: ErrorKind, message: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Skipped | JobOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobOutcome::TransientFailure { .. } | JobOutcome::PermanentFailure { .. }
        )
    }
}

/// Bound a provider call by `deadline`.
async fn with_deadline<T>(
    deadline: Duration,
    operation: &str,
    call: impl Future<Output = ProviderResult<T>>,
) -> ProviderResult<T> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(format!(
            "{} did not finish within {}s",
            operation,
            deadline.as_secs()
        ))),
    }
}

/// File name for the `index`-th artifact, keeping the URL's extension.
fn artifact_file_name(stem: &str, url: &str, default_ext: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    // Host only: no path segment to take an extension from.
    let ext = after_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .and_then(|path| path.rsplit('/').next())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(default_ext);
    format!("{}.{}", stem, ext.to_ascii_lowercase())
}

/// Runs jobs against the shared run context.
#[derive(Clone)]
pub struct JobPipeline {
    ctx: Arc<RunContext>,
}

impl JobPipeline {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Drive one job to an outcome. Provider failures never escape.
    pub async fn run(&self, job: Job) -> JobOutcome {
        let logger = JobLogger::new(&job.id, "pipeline");
        let span = logger.create_span();
        self.run_inner(job, logger).instrument(span).await
    }

    async fn run_inner(&self, mut job: Job, logger: JobLogger) -> JobOutcome {
        let ctx = &self.ctx;
        let started = Instant::now();

        if job.has_artifacts() {
            logger.log_progress("artifacts already exist, skipping");
            ctx.progress.record(ProgressEvent::Skipped {
                job_id: job.id.clone(),
                elapsed: started.elapsed(),
            });
            return JobOutcome::Skipped;
        }

        if !ctx.breaker.can_proceed() {
            logger.log_warning("circuit breaker open, deferring to next run");
            ctx.progress.record(ProgressEvent::Deferred {
                job_id: job.id.clone(),
            });
            return JobOutcome::Deferred;
        }

        logger.log_start(&format!("{} chars of prompt", job.prompt.len()));
        ctx.progress.record(ProgressEvent::Started {
            job_id: job.id.clone(),
        });

        match self.process(&mut job, &logger).await {
            Ok((images, video)) => {
                ctx.breaker.record_success();
                ctx.progress.record(ProgressEvent::Succeeded {
                    job_id: job.id.clone(),
                    images,
                    elapsed: started.elapsed(),
                });
                logger.log_completion(&format!("{} images, video: {}", images, video));
                JobOutcome::Succeeded { images, video }
            }
            Err(e) if e.is_transient() => {
                logger.log_warning(&format!("transient failure, left for next run: {}", e));
                ctx.progress.record(ProgressEvent::TransientFailure {
                    job_id: job.id.clone(),
                    elapsed: started.elapsed(),
                });
                JobOutcome::TransientFailure {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
            Err(e) => {
                let message = truncate_error(&e.to_string(), MAX_ERROR_LEN);
                logger.log_error(&message);
                if let Err(persist) = ctx
                    .store
                    .update_job(&job.id, &JobUpdate::new().set_error(&message))
                    .await
                {
                    logger.log_error(&format!("failed to persist error: {}", persist));
                }
                ctx.breaker.record_failure();
                ctx.progress.record(ProgressEvent::PermanentFailure {
                    job_id: job.id.clone(),
                    elapsed: started.elapsed(),
                });
                JobOutcome::PermanentFailure {
                    kind: e.kind(),
                    message,
                }
            }
        }
    }

    /// Returns (image count, video generated).
    async fn process(&self, job: &mut Job, logger: &JobLogger) -> WorkerResult<(usize, bool)> {
        let ctx = &self.ctx;
        let run_config = &ctx.run_config;

        let mut references = run_config.reference_images.clone();
        if let Some(reference) = self.prepare_reference(job, logger).await? {
            references.push(reference);
        }

        let request = GenerationRequest {
            prompt: job.prompt.clone(),
            reference_images: references,
            count: run_config.image_count,
            size: run_config.image_size,
            enable_safety_checker: !run_config.enable_unsafe,
        };

        let generation = ctx.generation.as_ref();
        let request_ref = &request;
        let deadline = ctx.config.call_timeout;
        let urls = retry_async(&RetryPolicy::generation(), move |attempt| async move {
            debug!(attempt = attempt, "Generation attempt");
            with_deadline(deadline, "generate", generation.generate(request_ref)).await
        })
        .await
        .into_result()?;

        logger.log_progress(&format!("generated {} images", urls.len()));
        self.download_images(job, &urls, logger).await;

        ctx.store
            .update_job(
                &job.id,
                &JobUpdate::new().generated_urls(urls.clone()).clear_error(),
            )
            .await?;
        job.generated_urls = urls;
        job.error = None;

        let video = if run_config.enable_video {
            self.generate_video(job, &logger.stage("video")).await
        } else {
            false
        };

        Ok((job.generated_urls.len(), video))
    }

    /// Analyze the attached reference image, persist the description as the
    /// job's prompt, and upload the image for use as a generation reference.
    async fn prepare_reference(
        &self,
        job: &mut Job,
        logger: &JobLogger,
    ) -> WorkerResult<Option<String>> {
        let ctx = &self.ctx;
        let (Some(url), Some(vision)) = (job.reference_image.clone(), ctx.vision.as_ref()) else {
            if job.reference_image.is_some() {
                debug!(job_id = %job.id, "No vision provider, reference image not used");
            }
            return Ok(None);
        };

        let logger = logger.stage("analysis");
        let image = ctx.sink.fetch(&url).await?;

        ctx.rate_limiter.acquire().await;
        let description = vision
            .analyze(&image.bytes, &image.mime_type, &ctx.config.vision_prompt)
            .await?;

        ctx.store
            .update_job(&job.id, &JobUpdate::new().prompt(&description))
            .await?;
        job.prompt = description;
        logger.log_progress("prompt replaced by image description");

        let uploaded = self.upload_reference(&image).await?;
        Ok(Some(uploaded))
    }

    async fn upload_reference(&self, image: &FetchedImage) -> WorkerResult<String> {
        let generation = self.ctx.generation.as_ref();
        match self
            .ctx
            .uploads
            .wrap_call(|| generation.upload_reference(image))
            .await
        {
            Ok(url) => Ok(url),
            Err(UploadCallError::TimedOut(after)) => Err(WorkerError::UploadTimeout(after)),
            Err(UploadCallError::Failed(e)) => Err(e.into()),
        }
    }

    fn job_dir(&self, job: &Job) -> PathBuf {
        self.ctx.config.output_dir.join(job.id.as_str())
    }

    /// Best-effort: failures are logged and the remote URLs stay the result.
    async fn download_images(&self, job: &Job, urls: &[String], logger: &JobLogger) {
        let dir = self.job_dir(job);
        for (index, url) in urls.iter().enumerate() {
            let dest = dir.join(artifact_file_name(&format!("image_{}", index), url, "png"));
            if let Err(e) = self.ctx.sink.download(url, &dest).await {
                logger.log_warning(&format!("download of {} failed: {}", url, e));
            }
        }
    }

    /// Video failures are recorded on the job without failing it.
    async fn generate_video(&self, job: &mut Job, logger: &JobLogger) -> bool {
        let ctx = &self.ctx;
        let Some(source) = job.generated_urls.first().cloned() else {
            return false;
        };

        let request = VideoRequest {
            source_image_url: source,
            prompt: job.effective_video_prompt().to_string(),
            duration: ctx.run_config.video_duration,
            style: ctx.run_config.video_style.clone(),
        };

        let generation = ctx.generation.as_ref();
        let request_ref = &request;
        let deadline = ctx.config.call_timeout;
        let result = retry_async(&RetryPolicy::video(), move |_| async move {
            with_deadline(deadline, "generate_video", generation.generate_video(request_ref)).await
        })
        .await
        .into_result();

        let persisted = match result {
            Ok(url) => {
                let dest = self.job_dir(job).join(artifact_file_name("video", &url, "mp4"));
                if let Err(e) = ctx.sink.download(&url, &dest).await {
                    logger.log_warning(&format!("video download failed: {}", e));
                }
                let outcome = ctx
                    .store
                    .update_job(&job.id, &JobUpdate::new().video_url(&url))
                    .await;
                job.video_url = Some(url);
                outcome
            }
            Err(e) => {
                let message = truncate_error(
                    &format!("Video generation failed: {}", e),
                    MAX_ERROR_LEN,
                );
                logger.log_warning(&message);
                ctx.progress.record(ProgressEvent::VideoFailed {
                    job_id: job.id.clone(),
                });
                let outcome = ctx
                    .store
                    .update_job(&job.id, &JobUpdate::new().set_error(&message))
                    .await;
                job.error = Some(message);
                if let Err(persist) = outcome {
                    logger.log_error(&format!("failed to persist video error: {}", persist));
                }
                return false;
            }
        };

        if let Err(e) = persisted {
            logger.log_error(&format!("failed to persist video url: {}", e));
        }
        ctx.progress.record(ProgressEvent::VideoGenerated {
            job_id: job.id.clone(),
        });
        logger.log_progress("video generated");
        true
    }
}
