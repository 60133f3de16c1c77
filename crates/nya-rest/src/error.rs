//! REST error types

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`RestClient`](crate::RestClient)
#[derive(Debug, Error)]
pub enum RestError {
    /// The API answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        /// Platform-specific JSON error code, when the body carried one
        code: Option<u64>,
    },

    /// Transport failure (DNS, TLS, connection reset, ...)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// A body could not be encoded, or a response was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The path could not be joined onto the base URL
    #[error("Invalid route: {0}")]
    InvalidRoute(String),
}

impl RestError {
    /// HTTP status of an API error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            Self::Json(_) | Self::InvalidRoute(_) => None,
        }
    }
}

/// REST result type
pub type RestResult<T> = Result<T, RestError>;
