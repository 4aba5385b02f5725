//! Batch driver paging, tallies and fatal errors.

mod common;

use std::sync::Arc;
use std::time::Duration;

use gbatch_models::{Job, RunConfig};
use gbatch_providers::{ErrorKind, InMemoryJobStore, ProviderError};
use gbatch_worker::{BatchDriver, WorkerConfig, WorkerError};

use common::*;

fn jobs(n: usize) -> Vec<Job> {
    (0..n)
        .map(|i| Job::new(format!("job-{:03}", i), format!("prompt {}", i)))
        .collect()
}

fn driver(config: WorkerConfig, store: Arc<InMemoryJobStore>, factory: FakeFactory) -> BatchDriver {
    BatchDriver::new(config, store, Arc::new(factory))
}

#[tokio::test]
async fn test_stops_on_short_page() {
    let generation = ScriptedGeneration::new();
    let store = store_with(RunConfig::new("k"), jobs(45));
    let driver = driver(test_config(), store.clone(), FakeFactory::new(generation.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(store.list_calls(), 3);
    assert_eq!(summary.progress.pages, 3);
    assert_eq!(summary.progress.processed, 45);
    assert_eq!(summary.progress.succeeded, 45);
    assert_eq!(generation.call_count(), 45);
    assert!(store.jobs().iter().all(|j| j.has_artifacts()));
    assert!(!summary.progress.running);
}

#[tokio::test]
async fn test_stops_on_empty_page() {
    let generation = ScriptedGeneration::new();
    let store = store_with(RunConfig::new("k"), jobs(40));
    let driver = driver(test_config(), store.clone(), FakeFactory::new(generation));

    let summary = driver.run().await.unwrap();

    assert_eq!(store.list_calls(), 3);
    assert_eq!(summary.progress.succeeded, 40);
}

#[tokio::test]
async fn test_transient_failures_not_refetched_within_run() {
    let generation = ScriptedGeneration::new();
    generation.fail_always(ProviderError::from_status(429, "slow down"));
    let store = store_with(RunConfig::new("k"), jobs(25));
    let driver = driver(test_config(), store.clone(), FakeFactory::new(generation.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(store.list_calls(), 2);
    assert_eq!(generation.call_count(), 25);
    assert_eq!(summary.progress.failed, 25);
    assert_eq!(summary.progress.transient_failures, 25);
    assert!(store.updates().is_empty());
    assert_eq!(summary.limits.unwrap().breaker.consecutive_failures, 0);
}

#[tokio::test]
async fn test_breaker_opens_and_defers_rest() {
    let generation = ScriptedGeneration::new();
    generation.fail_always(ProviderError::from_status(403, "forbidden"));
    let store = store_with(RunConfig::new("k"), jobs(10));
    let config = WorkerConfig {
        max_concurrent_jobs: 1,
        breaker_threshold: 3,
        breaker_cooldown: Duration::from_secs(3600),
        ..test_config()
    };
    let driver = driver(config, store.clone(), FakeFactory::new(generation.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(generation.call_count(), 3);
    assert_eq!(summary.progress.permanent_failures, 3);
    assert_eq!(summary.progress.deferred, 7);
    let limits = summary.limits.unwrap();
    assert_eq!(limits.breaker.total_breaks, 1);
    assert!(limits.breaker.open);

    let errored = store.jobs().iter().filter(|j| j.error.is_some()).count();
    assert_eq!(errored, 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_bounded_by_gate() {
    let generation = ScriptedGeneration::new();
    generation.set_delay(Duration::from_secs(10));
    let store = store_with(RunConfig::new("k"), jobs(12));
    let config = WorkerConfig {
        max_concurrent_jobs: 3,
        ..test_config()
    };
    let driver = driver(config, store, FakeFactory::new(generation.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(summary.progress.succeeded, 12);
    assert_eq!(generation.peak_in_flight(), 3);
    assert_eq!(summary.limits.unwrap().jobs.completed, 12);
}

#[tokio::test]
async fn test_missing_run_config_is_fatal() {
    let generation = ScriptedGeneration::new();
    let store = Arc::new(InMemoryJobStore::new(None, jobs(3)));
    let driver = driver(test_config(), store.clone(), FakeFactory::new(generation.clone()));

    let err = driver.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(store.list_calls(), 0);
    assert_eq!(generation.call_count(), 0);
    assert!(driver.summary().limits.is_none());
}

#[tokio::test]
async fn test_invalid_run_config_is_fatal() {
    let mut config = RunConfig::new("k");
    config.image_count = 9;
    let store = store_with(config, jobs(3));
    let driver = driver(test_config(), store, FakeFactory::new(ScriptedGeneration::new()));

    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, WorkerError::RunConfig(_)));
}

#[tokio::test]
async fn test_artifacted_and_errored_jobs_not_listed() {
    let generation = ScriptedGeneration::new();
    let mut all = jobs(3);
    all[0].generated_urls = vec!["https://cdn/x.png".into()];
    all[1].error = Some("earlier failure".into());
    let store = store_with(RunConfig::new("k"), all);
    let driver = driver(test_config(), store, FakeFactory::new(generation.clone()));

    let summary = driver.run().await.unwrap();

    assert_eq!(generation.call_count(), 1);
    assert_eq!(summary.progress.processed, 1);
}
