//! Application state.

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::services::RunManager;

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub runs: Arc<RunManager>,
}

impl AppState {
    pub fn new(config: ApiConfig, runs: Arc<RunManager>) -> Self {
        Self { config, runs }
    }
}
