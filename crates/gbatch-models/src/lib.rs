//! Shared data models for the GenBatch pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job records and partial updates written back to the job store
//! - The per-run configuration record (credentials, toggles, references)
//! - Small helpers shared by the worker and the API

pub mod job;
pub mod run_config;
pub mod utils;

pub use job::{ErrorUpdate, Job, JobId, JobUpdate};
pub use run_config::{Credentials, ImageSize, RunConfig, RunConfigError, VideoDuration};
pub use utils::{truncate_error, MAX_ERROR_LEN};
