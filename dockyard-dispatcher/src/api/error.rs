//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::dispatch_service::HookError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// The delivery could not be decoded
    BadRequest(String),
    /// The change batch was rejected
    Rejected(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Rejected(msg) => {
                tracing::warn!("Dispatch rejected: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<HookError> for ApiError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Rejected(reason) => ApiError::Rejected(reason),
            HookError::Upstream(msg) => ApiError::InternalError(msg),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
