//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{download_artifacts, health, run_status, start_run};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, mask_internal_errors, request_logging};
use crate::state::AppState;

pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let run_routes = Router::new()
        .route("/runs", post(start_run))
        .route("/runs/status", get(run_status))
        .route("/runs/artifacts", get(download_artifacts));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let mut router = Router::new()
        .nest("/api", run_routes)
        .route("/health", get(health))
        .merge(metrics_routes);

    if state.config.is_production() {
        router = router.layer(middleware::from_fn(mask_internal_errors));
    }

    router
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
