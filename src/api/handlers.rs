//! HTTP handlers over the relay service

use super::models::{ApiEnvelope, ChatResponseData, SupportListData};
use crate::error::RelayError;
use crate::metrics::METRICS;
use crate::relay::{CallerIdentity, Relay, RelayRequest};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error code for request bodies that fail to deserialize
pub const MALFORMED_REQUEST: &str = "MALFORMED_REQUEST";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Caller identity as forwarded by the upstream auth proxy
fn caller_identity(headers: &HeaderMap) -> CallerIdentity {
    CallerIdentity {
        caller_id: header_value(headers, "x-caller-id"),
        role: header_value(headers, "x-caller-role"),
    }
}

/// Relay a conversation
///
/// POST /api/v1/chat
pub async fn relay_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<RelayRequest>, JsonRejection>,
) -> ApiEnvelope {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_request(rejection),
    };
    let caller = caller_identity(&headers);

    match state.relay.relay(request, &caller).await {
        Ok(outcome) => match serde_json::to_value(ChatResponseData::from(outcome)) {
            Ok(data) => ApiEnvelope::success(StatusCode::OK, data),
            Err(e) => ApiEnvelope::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None),
        },
        Err(e) => e.into(),
    }
}

/// Envelope for a body that is not a well-formed relay request
fn malformed_request(rejection: JsonRejection) -> ApiEnvelope {
    warn!("Rejected relay request body: {}", rejection.body_text());
    ApiEnvelope::error(
        StatusCode::BAD_REQUEST,
        "'messages' and 'model_name' are required, and message fields must be strings",
        Some(json!({
            "error": MALFORMED_REQUEST,
            "detail": rejection.body_text(),
        })),
    )
}

/// Reload model configs
///
/// POST /api/v1/models/refresh
pub async fn refresh_models(State(state): State<AppState>) -> ApiEnvelope {
    info!("Model registry refresh requested");

    let relay = Arc::clone(&state.relay);
    let reloaded = tokio::task::spawn_blocking(move || relay.reload())
        .await
        .unwrap_or_else(|e| Err(RelayError::Config(format!("reload task failed: {}", e))));

    match reloaded {
        Ok(support_list) => support_list_envelope(support_list),
        Err(e) => {
            error!("Model registry refresh failed: {}", e);
            e.into()
        }
    }
}

/// List published models
///
/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> ApiEnvelope {
    support_list_envelope(state.relay.list_models())
}

fn support_list_envelope(support_list: Vec<String>) -> ApiEnvelope {
    ApiEnvelope::success(StatusCode::OK, json!(SupportListData { support_list }))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-caller-id", HeaderValue::from_static("alice"));
        headers.insert("x-caller-role", HeaderValue::from_static(" admin "));

        let caller = caller_identity(&headers);
        assert_eq!(caller.caller_id.as_deref(), Some("alice"));
        assert_eq!(caller.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_missing_or_blank_caller_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-caller-role", HeaderValue::from_static("  "));
        assert_eq!(caller_identity(&headers), CallerIdentity::default());
    }
}
