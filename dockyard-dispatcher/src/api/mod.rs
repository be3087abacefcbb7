//! API Module
//!
//! HTTP API layer for the dispatcher.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod hook;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::dispatch_service::DispatchService;

/// Shared handler state
pub type AppState = Arc<DispatchService>;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Webhook endpoints
        .route("/ci-proxy", get(health::ping))
        .route("/ci-proxy/hook", post(hook::receive_hook))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
