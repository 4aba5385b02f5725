//! End-to-end pipeline scenarios against scripted collaborators.

mod common;

use std::time::Duration;

use gbatch_models::{Job, RunConfig, MAX_ERROR_LEN};
use gbatch_providers::{ErrorKind, ProviderError};
use gbatch_worker::{JobOutcome, JobPipeline, WorkerConfig};

use common::*;

fn run_config() -> RunConfig {
    let mut config = RunConfig::new("gen-key");
    config.image_count = 2;
    config
}

#[tokio::test(start_paused = true)]
async fn test_503_then_success_persists_urls() {
    let generation = ScriptedGeneration::new();
    generation.push_status(503, "service unavailable");
    let factory = FakeFactory::new(generation.clone());
    let store = store_with(run_config(), vec![Job::new("job-1", "a lighthouse at dusk")]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);

    // A prior failure must be cleared by the success.
    ctx.breaker.record_failure();

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            images: 2,
            video: false
        }
    );

    let job = store.job("job-1").unwrap();
    assert_eq!(job.generated_urls.len(), 2);
    assert!(job.error.is_none());
    assert_eq!(ctx.breaker.consecutive_failures(), 0);

    let times = generation.call_times();
    assert_eq!(times.len(), 2);
    let gap = millis_between(times[0], times[1]);
    assert!((1000..1010).contains(&gap), "gap was {}ms", gap);

    assert_eq!(factory.sink.downloaded().len(), 2);
    let (_, dest) = &factory.sink.downloaded()[0];
    assert!(dest.ends_with("job-1/image_0.png"));

    let snap = ctx.progress.snapshot();
    assert_eq!(snap.succeeded, 1);
    assert_eq!(snap.failed, 0);
}

#[tokio::test]
async fn test_existing_artifacts_skip_everything() {
    let generation = ScriptedGeneration::new();
    let factory = FakeFactory::new(generation.clone());
    let done = Job::new("done", "p").with_generated_urls(vec!["https://cdn/old.png".into()]);
    let store = store_with(run_config(), vec![done.clone()]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);
    ctx.breaker.record_failure();

    let outcome = JobPipeline::new(ctx.clone()).run(done).await;

    assert_eq!(outcome, JobOutcome::Skipped);
    assert!(outcome.is_success());
    assert_eq!(generation.call_count(), 0);
    assert!(store.updates().is_empty());
    assert!(factory.sink.downloaded().is_empty());
    // Breaker untouched either way.
    assert_eq!(ctx.breaker.consecutive_failures(), 1);
}

#[tokio::test]
async fn test_throttled_is_left_for_next_run() {
    let generation = ScriptedGeneration::new();
    generation.push_status(429, "Too Many Requests");
    let factory = FakeFactory::new(generation.clone());
    let store = store_with(run_config(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::TransientFailure {
            kind: ErrorKind::Throttled,
            ..
        }
    ));
    // Throttling is not retried at the call level.
    assert_eq!(generation.call_count(), 1);
    assert!(store.job("job-1").unwrap().error.is_none());
    assert!(store.updates().is_empty());
    assert_eq!(ctx.breaker.consecutive_failures(), 0);
    assert_eq!(ctx.progress.snapshot().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_validation_error_aborts_and_persists() {
    let generation = ScriptedGeneration::new();
    generation.push_status(400, "prompt rejected");
    let factory = FakeFactory::new(generation.clone());
    let store = store_with(run_config(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);
    let started = tokio::time::Instant::now();

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::PermanentFailure {
            kind: ErrorKind::Validation,
            ..
        }
    ));
    assert_eq!(generation.call_count(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);

    let error = store.job("job-1").unwrap().error.unwrap();
    assert!(error.contains("HTTP 400"), "error was {}", error);
    assert_eq!(ctx.breaker.consecutive_failures(), 1);
    assert_eq!(ctx.progress.snapshot().permanent_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_retried_three_times() {
    let generation = ScriptedGeneration::new();
    generation.fail_always(ProviderError::from_status(503, "unavailable"));
    let factory = FakeFactory::new(generation.clone());
    let store = store_with(run_config(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::TransientFailure {
            kind: ErrorKind::ServerError,
            ..
        }
    ));

    let times = generation.call_times();
    assert_eq!(times.len(), 3);
    let first = millis_between(times[0], times[1]);
    let second = millis_between(times[1], times[2]);
    assert!((1000..1010).contains(&first), "first gap {}ms", first);
    assert!((2000..2010).contains(&second), "second gap {}ms", second);

    assert!(store.job("job-1").unwrap().error.is_none());
    assert_eq!(ctx.breaker.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_open_breaker_defers_without_calls() {
    let generation = ScriptedGeneration::new();
    let factory = FakeFactory::new(generation.clone());
    let store = store_with(run_config(), vec![Job::new("job-1", "p")]);
    let config = WorkerConfig {
        breaker_threshold: 2,
        ..test_config()
    };
    let ctx = context(config, run_config(), store.clone(), &factory);
    ctx.breaker.record_failure();
    ctx.breaker.record_failure();

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert_eq!(outcome, JobOutcome::Deferred);
    assert!(!outcome.is_failure());
    assert_eq!(generation.call_count(), 0);
    assert!(store.updates().is_empty());

    let snap = ctx.progress.snapshot();
    assert_eq!(snap.deferred, 1);
    assert_eq!(snap.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_video_failure_does_not_fail_job() {
    let generation = ScriptedGeneration::new();
    generation.push_video(Err(ProviderError::from_status(422, "unsupported duration")));
    let factory = FakeFactory::new(generation.clone());
    let mut config = run_config();
    config.enable_video = true;
    let store = store_with(config.clone(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), config, store.clone(), &factory);

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            images: 2,
            video: false
        }
    );
    // Not a retryable video kind.
    assert_eq!(generation.video_requests().len(), 1);

    let job = store.job("job-1").unwrap();
    assert_eq!(job.generated_urls.len(), 2);
    assert!(job.video_url.is_none());
    assert!(job
        .error
        .unwrap()
        .starts_with("Video generation failed"));
    assert_eq!(ctx.breaker.consecutive_failures(), 0);
    assert_eq!(ctx.progress.snapshot().video_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_video_retries_gateway_timeout() {
    let generation = ScriptedGeneration::new();
    generation.push_video(Err(ProviderError::from_status(504, "")));
    let factory = FakeFactory::new(generation.clone());
    let mut config = run_config();
    config.enable_video = true;
    let store = store_with(
        config.clone(),
        vec![Job::new("job-1", "p").with_video_prompt("slow zoom")],
    );
    let ctx = context(test_config(), config, store.clone(), &factory);

    let outcome = JobPipeline::new(ctx.clone())
        .run(store.job("job-1").unwrap())
        .await;

    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            images: 2,
            video: true
        }
    );

    let times = generation.video_call_times();
    assert_eq!(times.len(), 2);
    let gap = millis_between(times[0], times[1]);
    assert!((5000..5010).contains(&gap), "gap was {}ms", gap);

    let requests = generation.video_requests();
    assert_eq!(requests[0].prompt, "slow zoom");
    assert_eq!(
        requests[0].source_image_url,
        store.job("job-1").unwrap().generated_urls[0]
    );
    assert_eq!(
        store.job("job-1").unwrap().video_url.as_deref(),
        Some("https://cdn.test/video.mp4")
    );
}

#[tokio::test]
async fn test_reference_image_is_analyzed_and_uploaded() {
    let generation = ScriptedGeneration::new();
    let vision = FixedVision::new("an oil painting of a harbour");
    let factory = FakeFactory::new(generation.clone()).with_vision(vision.clone());
    let mut config = run_config();
    config.reference_images = vec!["https://refs.test/style.png".into()];
    let job = Job::new("job-1", "original").with_reference_image("https://refs.test/input.jpg");
    let store = store_with(config.clone(), vec![job.clone()]);
    let ctx = context(test_config(), config, store.clone(), &factory);

    let outcome = JobPipeline::new(ctx.clone()).run(job).await;
    assert!(outcome.is_success());

    assert_eq!(vision.call_count(), 1);
    assert_eq!(generation.upload_count(), 1);
    assert_eq!(ctx.rate_limiter.stats().total_requests, 1);

    let request = &generation.requests()[0];
    assert_eq!(request.prompt, "an oil painting of a harbour");
    assert_eq!(
        request.reference_images,
        vec![
            "https://refs.test/style.png".to_string(),
            "https://cdn.test/uploads/1.png".to_string(),
        ]
    );

    let updates = store.updates_for("job-1");
    assert_eq!(
        updates[0].prompt.as_deref(),
        Some("an oil painting of a harbour")
    );
    assert_eq!(
        store.job("job-1").unwrap().prompt,
        "an oil painting of a harbour"
    );
}

#[tokio::test]
async fn test_reference_ignored_without_vision() {
    let generation = ScriptedGeneration::new();
    let factory = FakeFactory::new(generation.clone());
    let job = Job::new("job-1", "original").with_reference_image("https://refs.test/input.jpg");
    let store = store_with(run_config(), vec![job.clone()]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);

    assert!(JobPipeline::new(ctx).run(job).await.is_success());
    assert_eq!(generation.upload_count(), 0);
    assert_eq!(generation.requests()[0].prompt, "original");
    assert!(generation.requests()[0].reference_images.is_empty());
}

#[tokio::test]
async fn test_download_failure_is_not_fatal() {
    let generation = ScriptedGeneration::new();
    let factory = FakeFactory::new(generation.clone()).with_sink(RecordingSink::failing());
    let store = store_with(run_config(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);

    let outcome = JobPipeline::new(ctx)
        .run(store.job("job-1").unwrap())
        .await;

    assert!(outcome.is_success());
    assert_eq!(store.job("job-1").unwrap().generated_urls.len(), 2);
}

#[tokio::test]
async fn test_persisted_error_is_truncated() {
    let generation = ScriptedGeneration::new();
    generation.push_status(400, &"x".repeat(2000));
    let factory = FakeFactory::new(generation.clone());
    let store = store_with(run_config(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), run_config(), store.clone(), &factory);

    JobPipeline::new(ctx)
        .run(store.job("job-1").unwrap())
        .await;

    let error = store.job("job-1").unwrap().error.unwrap();
    assert_eq!(error.chars().count(), MAX_ERROR_LEN);
}

#[tokio::test]
async fn test_safety_toggle_and_size_forwarded() {
    let generation = ScriptedGeneration::new();
    let factory = FakeFactory::new(generation.clone());
    let mut config = run_config();
    config.enable_unsafe = true;
    config.image_count = 4;
    let store = store_with(config.clone(), vec![Job::new("job-1", "p")]);
    let ctx = context(test_config(), config.clone(), store.clone(), &factory);

    JobPipeline::new(ctx)
        .run(store.job("job-1").unwrap())
        .await;

    let request = &generation.requests()[0];
    assert!(!request.enable_safety_checker);
    assert_eq!(request.count, 4);
    assert_eq!(request.size, config.image_size);
}
