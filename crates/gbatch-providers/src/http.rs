//! Shared HTTP response handling.

use std::time::Instant;

use reqwest::Response;
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::record_request;

/// Body text kept in error messages.
const MAX_ERROR_BODY: usize = 300;

/// Turn a non-success response into a status-coded [`ProviderError`].
pub(crate) async fn check_response(
    provider: &str,
    operation: &str,
    started: Instant,
    response: Response,
) -> ProviderResult<Response> {
    let status = response.status();
    record_request(
        provider,
        operation,
        status.as_u16(),
        started.elapsed().as_secs_f64() * 1000.0,
    );

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    warn!(
        provider = provider,
        operation = operation,
        status = status.as_u16(),
        "Provider request failed: {}",
        body
    );
    Err(ProviderError::from_status(status.as_u16(), body))
}
