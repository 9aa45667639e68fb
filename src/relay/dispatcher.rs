//! Outbound chat-completion exchange with the provider
//!
//! One request per call, no retries. Provider failures are returned verbatim
//! so the caller can decide on backoff.

use super::parameters::EffectiveParameters;
use crate::context::ConversationMessage;
use crate::error::{RelayError, Result};
use crate::registry::ModelConfig;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Whole-exchange deadline
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// One completion returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    /// Absent when the provider's content filter withholds the completion
    #[serde(default)]
    pub content: Option<String>,
}

/// Normalized provider result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResult {
    pub token_usage: u64,
    pub choices: Vec<Choice>,
}

// Provider wire types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ConversationMessage],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    n: u32,
    presence_penalty: f64,
    frequency_penalty: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    usage: Usage,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

/// Sends bounded requests to a model deployment
#[derive(Clone)]
pub struct RequestDispatcher {
    http: Client,
}

impl RequestDispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Chat-completions URL of the model's deployment
    pub fn endpoint_url(config: &ModelConfig) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint_base.trim_end_matches('/'),
            config.deployment_name,
            config.api_version
        )
    }

    /// Perform one exchange with the provider
    pub async fn dispatch(
        &self,
        conversation: &[ConversationMessage],
        config: &ModelConfig,
        params: &EffectiveParameters,
    ) -> Result<RelayResult> {
        let url = Self::endpoint_url(config);
        let request_body = ChatCompletionRequest {
            messages: conversation,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            n: params.num_results,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
        };

        debug!(
            "Dispatching {} messages to deployment {}",
            conversation.len(),
            config.deployment_name
        );

        let response = self
            .http
            .post(&url)
            .header("api-key", config.credential.expose_secret())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!("Transport failure for {}: {}", config.name, e);
                RelayError::Transport {
                    message: e.to_string(),
                    timed_out: e.is_timeout(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RelayError::Transport {
            message: e.to_string(),
            timed_out: e.is_timeout(),
        })?;

        if !status.is_success() {
            error!("Provider returned {} for {}", status, config.name);
            return Err(RelayError::Provider {
                status_code: status.as_u16(),
                body: serde_json::from_str(&body).unwrap_or(Value::String(body)),
            });
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;

        Ok(RelayResult {
            token_usage: completion.usage.total_tokens,
            choices: completion.choices,
        })
    }
}
