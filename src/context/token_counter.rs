//! Conversation token accounting by model family
//!
//! A model family groups model names that share the provider's fixed
//! per-message framing cost. Families are matched on a model-name prefix,
//! longest registered prefix first, so new deployments are added by
//! registering a prefix rather than touching the dispatch path.

use super::models::ConversationMessage;
use super::token_estimator::{TiktokenEstimator, TokenEstimator, CL100K_BASE};
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Tokenization rules shared by a group of models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFamily {
    /// Model-name prefix this family claims, matched case-insensitively
    pub prefix: String,
    /// Fixed framing cost added for every message
    pub tokens_per_message: i64,
    /// Added once after all messages (the primed assistant turn)
    pub reply_primer: i64,
    /// Context window used when a model record omits `token_limit`
    pub default_token_limit: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    CL100K_BASE.to_string()
}

impl ModelFamily {
    pub fn new(
        prefix: impl Into<String>,
        tokens_per_message: i64,
        reply_primer: i64,
        default_token_limit: usize,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            tokens_per_message,
            reply_primer,
            default_token_limit,
            encoding: default_encoding(),
        }
    }

    fn matches(&self, model_name: &str) -> bool {
        model_name
            .to_ascii_lowercase()
            .starts_with(&self.prefix.to_ascii_lowercase())
    }

    /// Apply the reply primer to a sum of per-message costs
    pub fn finish(&self, message_total: usize) -> usize {
        (message_total as i64 + self.reply_primer).max(0) as usize
    }
}

/// Families known out of the box
pub fn builtin_families() -> Vec<ModelFamily> {
    vec![
        ModelFamily::new("gpt-3.5", 4, -1, 4096),
        // Azure deployments spell the same models without the dot
        ModelFamily::new("gpt-35", 4, -1, 4096),
        ModelFamily::new("gpt-4", 3, 1, 8192),
    ]
}

/// Counts conversation tokens under per-family rules
pub struct TokenCounter {
    families: Vec<ModelFamily>,
    estimators: HashMap<String, Arc<dyn TokenEstimator>>,
}

impl TokenCounter {
    /// Built-in families backed by the tiktoken cl100k_base encoding
    pub fn new() -> Result<Self> {
        let estimator: Arc<dyn TokenEstimator> = Arc::new(TiktokenEstimator::new()?);
        let estimators = HashMap::from([(CL100K_BASE.to_string(), estimator)]);
        Self::from_parts(builtin_families(), estimators)
    }

    /// Build from explicit families and encodings
    pub fn from_parts(
        families: Vec<ModelFamily>,
        estimators: HashMap<String, Arc<dyn TokenEstimator>>,
    ) -> Result<Self> {
        let mut counter = Self {
            families: Vec::new(),
            estimators,
        };
        for family in families {
            counter.register_family(family)?;
        }
        Ok(counter)
    }

    /// Register a family, replacing any family with the same prefix
    pub fn register_family(&mut self, family: ModelFamily) -> Result<()> {
        if family.prefix.is_empty() {
            return Err(RelayError::Config("model family prefix is empty".to_string()));
        }
        if !self.estimators.contains_key(&family.encoding) {
            return Err(RelayError::Config(format!(
                "model family {} uses unknown encoding {}",
                family.prefix, family.encoding
            )));
        }

        self.families
            .retain(|f| !f.prefix.eq_ignore_ascii_case(&family.prefix));
        self.families.push(family);
        // Longest prefix wins
        self.families
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(())
    }

    /// Resolve the family for a model name
    pub fn family(&self, model_name: &str) -> Result<&ModelFamily> {
        self.families
            .iter()
            .find(|f| f.matches(model_name))
            .ok_or_else(|| {
                RelayError::UnsupportedModel(format!(
                    "no token family registered for {}",
                    model_name
                ))
            })
    }

    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    fn estimator(&self, family: &ModelFamily) -> Result<&Arc<dyn TokenEstimator>> {
        self.estimators.get(&family.encoding).ok_or_else(|| {
            RelayError::Config(format!("encoding {} is not loaded", family.encoding))
        })
    }

    /// Cost of one message: framing overhead plus content tokens
    pub fn message_cost(
        &self,
        message: &ConversationMessage,
        family: &ModelFamily,
    ) -> Result<usize> {
        let content = self.estimator(family)?.estimate(&message.content) as i64;
        Ok((family.tokens_per_message + content).max(0) as usize)
    }

    /// Total prompt tokens for a conversation sent to `model_name`
    pub fn count(&self, conversation: &[ConversationMessage], model_name: &str) -> Result<usize> {
        let family = self.family(model_name)?;
        let mut total = 0;
        for message in conversation {
            total += self.message_cost(message, family)?;
        }
        Ok(family.finish(total))
    }
}
