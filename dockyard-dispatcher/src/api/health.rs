//! Health Check API Handlers
//!
//! Liveness endpoints for monitoring and webhook setup.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /ci-proxy
/// Reachability check of the webhook endpoint
pub async fn ping() -> &'static str {
    "pong"
}
