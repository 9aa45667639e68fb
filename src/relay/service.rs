//! Relay orchestration
//!
//! One call resolves the model config, validates the conversation and
//! parameters, trims the conversation to the budget and dispatches it.
//! Nothing reaches the provider unless every earlier step succeeded.

use super::dispatcher::{RelayResult, RequestDispatcher};
use super::parameters::{ParameterValidator, SamplingOverrides};
use crate::context::{BudgetTrimmer, Conversation, IncomingMessage, TokenCounter};
use crate::error::{RelayError, Result};
use crate::metrics::METRICS;
use crate::registry::{ModelConfig, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Metric label for requests naming a model the registry does not know
pub const UNKNOWN_MODEL_LABEL: &str = "unknown";

/// Inbound relay request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub model_name: String,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(flatten)]
    pub overrides: SamplingOverrides,
}

/// Who is calling, as established by the upstream auth layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub caller_id: Option<String>,
    pub role: Option<String>,
}

/// Provider result plus the conversation actually sent
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub result: RelayResult,
    pub conversation: Conversation,
    pub trimmed_messages: usize,
    pub prompt_tokens: usize,
}

/// The relay service
pub struct Relay {
    registry: Arc<ModelRegistry>,
    trimmer: BudgetTrimmer,
    validator: ParameterValidator,
    dispatcher: RequestDispatcher,
}

impl Relay {
    pub fn new(
        registry: Arc<ModelRegistry>,
        counter: Arc<TokenCounter>,
        dispatcher: RequestDispatcher,
    ) -> Self {
        Self {
            registry,
            trimmer: BudgetTrimmer::new(counter),
            validator: ParameterValidator::new(),
            dispatcher,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Relay one conversation to the named model
    pub async fn relay(&self, request: RelayRequest, caller: &CallerIdentity) -> Result<RelayOutcome> {
        let span = info_span!(
            "relay",
            request_id = %Uuid::new_v4(),
            model = %request.model_name,
            caller_id = caller.caller_id.as_deref().unwrap_or("anonymous"),
            caller_role = caller.role.as_deref().unwrap_or("-"),
        );

        async move {
            let start = Instant::now();
            // Resolved once; a concurrent reload cannot change this call's endpoint
            let (model, outcome) = match self.registry.resolve(&request.model_name) {
                Ok(config) => (config.name.clone(), self.relay_with(request, &config).await),
                Err(e) => (UNKNOWN_MODEL_LABEL.to_string(), Err(e)),
            };

            match &outcome {
                Ok(outcome) => {
                    METRICS.record_relay(&model, "success", start.elapsed());
                    info!(
                        "Relay succeeded: {} prompt tokens, {} messages trimmed, {} total tokens",
                        outcome.prompt_tokens, outcome.trimmed_messages, outcome.result.token_usage
                    );
                }
                Err(e) => {
                    METRICS.record_relay(&model, e.code(), start.elapsed());
                    warn!("Relay failed: {}", e);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn relay_with(&self, request: RelayRequest, config: &ModelConfig) -> Result<RelayOutcome> {
        let conversation = self.validator.validate_conversation(&request.messages)?;
        let params = self.validator.validate(&request.overrides, config)?;

        let trimmed = self.trimmer.trim(
            conversation,
            &config.name,
            config.token_limit,
            params.max_tokens as usize,
        )?;
        if trimmed.conversation.is_empty() {
            return Err(RelayError::BudgetExhausted {
                pinned_tokens: 0,
                max_response_tokens: params.max_tokens as usize,
                token_limit: config.token_limit,
            });
        }
        METRICS.record_trim(trimmed.used, trimmed.removed);

        let result = self
            .dispatcher
            .dispatch(&trimmed.conversation, config, &params)
            .await?;

        Ok(RelayOutcome {
            result,
            conversation: trimmed.conversation,
            trimmed_messages: trimmed.removed,
            prompt_tokens: trimmed.used,
        })
    }

    /// Reload model configs, returning the newly published names
    pub fn reload(&self) -> Result<Vec<String>> {
        self.registry.reload()
    }

    pub fn list_models(&self) -> Vec<String> {
        self.registry.list_models()
    }
}
