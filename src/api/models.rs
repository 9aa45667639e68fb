//! Wire models for the HTTP API

use crate::error::RelayError;
use crate::relay::{Choice, RelayOutcome};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response envelope shared by every endpoint
///
/// `code` repeats the HTTP status; `message` is set on errors and `data`
/// carries the payload (or error details).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub code: u16,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiEnvelope {
    pub fn success(code: StatusCode, data: Value) -> Self {
        Self {
            code: code.as_u16(),
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }

    pub fn error(code: StatusCode, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code: code.as_u16(),
            status: "error".to_string(),
            message: Some(message.into()),
            data,
        }
    }
}

impl IntoResponse for ApiEnvelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<RelayError> for ApiEnvelope {
    fn from(err: RelayError) -> Self {
        // Provider statuses outside the valid range still need a sendable code
        let code = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
        Self::error(code, err.to_string(), Some(err.details()))
    }
}

/// Successful chat payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseData {
    pub token_usage: u64,
    pub messages: Vec<Choice>,
    pub trimmed_messages: usize,
    pub prompt_tokens: usize,
}

impl From<RelayOutcome> for ChatResponseData {
    fn from(outcome: RelayOutcome) -> Self {
        Self {
            token_usage: outcome.result.token_usage,
            messages: outcome.result.choices,
            trimmed_messages: outcome.trimmed_messages,
            prompt_tokens: outcome.prompt_tokens,
        }
    }
}

/// Model listing payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportListData {
    pub support_list: Vec<String>,
}
