//! Error types for the Dockyard clients

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to the source-hosting API or the build server
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never got a response
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The remote answered with a non-success status
    #[error("remote returned {status}: {message}")]
    ApiError { status: u16, message: String },

    /// The response body is not what the endpoint documents
    #[error("unexpected response body: {0}")]
    ParseError(String),
}

impl ClientError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Status code of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for transport errors, rate limits and 5xx answers
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
            Self::ParseError(_) => false,
        }
    }
}
