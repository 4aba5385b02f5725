//! Services backing the HTTP handlers.

pub mod artifacts;
pub mod run_manager;

pub use artifacts::{archive_filename, bundle_artifacts};
pub use run_manager::{FinishedRun, RunManager, RunStarted, RunStatus};
