//! Provider error types.

use serde::Serialize;
use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure category, assigned at the point a failure is raised.
///
/// Retry and transient/permanent decisions compare kinds by equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// HTTP 504 from the provider or an intermediary.
    GatewayTimeout,
    /// HTTP 408, client-side request timeout, or a local call deadline.
    Timeout,
    /// Any other 5xx.
    ServerError,
    /// HTTP 429 or an intermediary's throttling response.
    Throttled,
    /// Rejected input (400/422) or an unusable response body.
    Validation,
    /// Any other 4xx.
    Upstream4xx,
    /// Connection could not be established or was dropped.
    Network,
    /// Missing credentials or configuration.
    Config,
    /// Local filesystem failure.
    Io,
}

impl ErrorKind {
    /// Map an HTTP status code to a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            504 => ErrorKind::GatewayTimeout,
            408 => ErrorKind::Timeout,
            429 => ErrorKind::Throttled,
            500..=599 => ErrorKind::ServerError,
            400 | 422 => ErrorKind::Validation,
            _ => ErrorKind::Upstream4xx,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::GatewayTimeout => "gateway_timeout",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Validation => "validation",
            ErrorKind::Upstream4xx => "upstream_4xx",
            ErrorKind::Network => "network",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

/// Error returned by every collaborator.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .kind.as_str(), .message)]
pub struct ProviderError {
    pub kind: ErrorKind,
    /// HTTP status when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build from a non-success HTTP response.
    pub fn from_status(status: u16, body: impl AsRef<str>) -> Self {
        let body = body.as_ref();
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };
        Self {
            kind: ErrorKind::from_status(status),
            status: Some(status),
            message,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ErrorKind::Timeout
        } else if let Some(status) = e.status() {
            ErrorKind::from_status(status.as_u16())
        } else if e.is_decode() || e.is_body() {
            // Truncated or unreadable upstream body.
            ErrorKind::ServerError
        } else {
            ErrorKind::Network
        };
        Self {
            kind,
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::validation(format!("JSON error: {}", e))
    }
}
