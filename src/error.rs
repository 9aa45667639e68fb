//! Error taxonomy for the relay
//!
//! Every failure the relay can produce is classified into one of these
//! variants and returned to the caller with enough structure to act on.

use serde_json::{json, Value};
use thiserror::Error;

/// Relay result alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad or missing configuration source/record. Fatal to a reload,
    /// never to an already published snapshot.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model not supported: {0}")]
    UnsupportedModel(String),

    #[error("Malformed conversation at message {index}: {reason}")]
    MalformedConversation { index: usize, reason: String },

    #[error("Parameter {field} out of range: {value} not in [{min}, {max}]")]
    ParameterRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "Budget exhausted: pinned messages use {pinned_tokens} tokens, \
         {max_response_tokens} reserved for the response, limit is {token_limit}"
    )]
    BudgetExhausted {
        pinned_tokens: usize,
        max_response_tokens: usize,
        token_limit: usize,
    },

    #[error("Provider returned status {status_code}")]
    Provider { status_code: u16, body: Value },

    #[error("Transport error: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl RelayError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::UnsupportedModel(_) => "UNSUPPORTED_MODEL",
            Self::MalformedConversation { .. } => "MALFORMED_CONVERSATION",
            Self::ParameterRange { .. } => "PARAMETER_RANGE",
            Self::BudgetExhausted { .. } => "BUDGET_EXHAUSTED",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// HTTP status the API layer reports for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::UnsupportedModel(_)
            | Self::MalformedConversation { .. }
            | Self::ParameterRange { .. }
            | Self::BudgetExhausted { .. } => 400,
            Self::Provider { status_code, .. } => *status_code,
            Self::Transport { timed_out: true, .. } => 504,
            Self::Transport { .. } | Self::InvalidResponse(_) => 502,
        }
    }

    /// Whether the caller can sensibly retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Provider { status_code, .. } => *status_code == 429 || *status_code >= 500,
            _ => false,
        }
    }

    /// Structured details for the response envelope
    pub fn details(&self) -> Value {
        match self {
            Self::MalformedConversation { index, .. } => json!({
                "error": self.code(),
                "index": index,
            }),
            Self::ParameterRange { field, value, min, max } => json!({
                "error": self.code(),
                "field": field,
                "value": value,
                "min": min,
                "max": max,
            }),
            Self::BudgetExhausted {
                pinned_tokens,
                max_response_tokens,
                token_limit,
            } => json!({
                "error": self.code(),
                "pinned_tokens": pinned_tokens,
                "max_response_tokens": max_response_tokens,
                "token_limit": token_limit,
            }),
            Self::Provider { status_code, body } => json!({
                "error": self.code(),
                "status_code": status_code,
                "body": body,
            }),
            Self::Transport { timed_out, .. } => json!({
                "error": self.code(),
                "timed_out": timed_out,
            }),
            _ => json!({ "error": self.code() }),
        }
    }
}
