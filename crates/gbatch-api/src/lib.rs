//! HTTP surface for triggering batch runs.
//!
//! This crate provides:
//! - `POST /api/runs` to start a run in the background
//! - `GET /api/runs/status` for live progress and the last summary
//! - `GET /api/runs/artifacts` to download the output directory as a zip

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::RunManager;
pub use state::AppState;
