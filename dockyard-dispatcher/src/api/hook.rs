//! Webhook API Handler
//!
//! Receives source-hosting deliveries, as JSON or as a form-encoded
//! `payload=` field, and hands them to the dispatch service.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
};
use dockyard_core::dto::webhook::{EVENT_HEADER, WebhookEvent};
use serde_json::Value;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::dispatch_service::HookOutcome;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// POST /ci-proxy/hook
/// Dispatch the build requests of one delivery
pub async fn receive_hook(
    State(service): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<HookOutcome>> {
    let event_name = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    tracing::debug!("Delivery: event={:?}, {} bytes", event_name, body.len());

    let payload = decode_payload(content_type, &body)?;
    let event = WebhookEvent::parse(event_name, payload).map_err(|e| {
        ApiError::BadRequest(format!(
            "Invalid {} payload: {}",
            event_name.unwrap_or("webhook"),
            e
        ))
    })?;

    let outcome = service.handle(event).await?;
    Ok(Json(outcome))
}

/// Decodes the JSON payload of a delivery
pub fn decode_payload(content_type: Option<&str>, body: &[u8]) -> ApiResult<Value> {
    let is_form = content_type.is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));

    if !is_form {
        return serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)));
    }

    let payload = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| ApiError::BadRequest("Missing payload field".to_string()))?;

    serde_json::from_str(&payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {}", e)))
}
