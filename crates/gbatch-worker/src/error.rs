//! Worker error types.

use std::time::Duration;

use thiserror::Error;

use gbatch_models::RunConfigError;
use gbatch_providers::{ErrorKind, ProviderError};

use crate::retry::TRANSIENT_KINDS;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid run configuration: {0}")]
    RunConfig(#[from] RunConfigError),

    #[error("Reference upload timed out after {0:?}")]
    UploadTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Failure category used for retry and persistence decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Provider(e) => e.kind,
            WorkerError::RunConfig(_) => ErrorKind::Config,
            WorkerError::UploadTimeout(_) => ErrorKind::Timeout,
            WorkerError::Io(_) => ErrorKind::Io,
        }
    }

    /// Transient failures are left for the next run to pick up.
    pub fn is_transient(&self) -> bool {
        TRANSIENT_KINDS.contains(&self.kind())
    }
}
