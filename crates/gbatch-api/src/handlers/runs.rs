//! Run trigger, status and artifact download handlers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_bundle_size, record_run_triggered};
use crate::services::{archive_filename, bundle_artifacts, RunStarted, RunStatus};
use crate::state::AppState;

/// POST /api/runs
pub async fn start_run(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<RunStarted>)> {
    match state.runs.start() {
        Ok(started) => {
            record_run_triggered(true);
            Ok((StatusCode::ACCEPTED, Json(started)))
        }
        Err(e) => {
            record_run_triggered(false);
            Err(e)
        }
    }
}

/// GET /api/runs/status
pub async fn run_status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.runs.status())
}

/// GET /api/runs/artifacts
///
/// Zips the output directory. Refused while a run is writing into it.
pub async fn download_artifacts(State(state): State<AppState>) -> ApiResult<Response> {
    if state.runs.is_running() {
        return Err(ApiError::conflict("a run is in progress"));
    }

    let root = state.runs.output_dir().to_path_buf();
    let bundle = tokio::task::spawn_blocking(move || bundle_artifacts(&root))
        .await
        .map_err(|e| ApiError::internal(format!("Bundling task failed: {e}")))??;

    let Some(bytes) = bundle else {
        return Err(ApiError::not_found("no artifacts have been downloaded"));
    };

    record_bundle_size(bytes.len());
    let filename = archive_filename();
    info!(bytes = bytes.len(), filename = %filename, "Serving artifact bundle");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}
