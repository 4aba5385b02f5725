//! Batch generation worker.
//!
//! This crate provides:
//! - [`JobPipeline`]: one job through analysis, generation, download and video
//! - [`BatchDriver`]: pages the store and runs each page through the gate
//! - Retry policies keyed on structured error kinds
//! - Progress tracking and the end-of-run summary

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod retry;

pub use config::WorkerConfig;
pub use context::{HttpProviderFactory, LimiterStats, ProviderFactory, RunContext};
pub use driver::{BatchDriver, RunSummary};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{JobOutcome, JobPipeline};
pub use progress::{ProgressEvent, ProgressSnapshot, ProgressTracker};
pub use retry::{retry_async, RetryPolicy, RetryResult};
