//! Token budget enforcement by evicting the oldest history
//!
//! A request fits when `prompt_tokens + max_response_tokens < token_limit`.
//! Until it fits, the earliest message after the pinned system prefix is
//! dropped. Pinned messages are never removed; if they alone do not fit the
//! request is rejected.

use super::models::{pinned_prefix_len, Conversation};
use super::token_counter::TokenCounter;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of trimming a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimOutcome {
    pub conversation: Conversation,
    /// Messages evicted from the front of the history
    pub removed: usize,
    /// Prompt tokens of the returned conversation
    pub used: usize,
}

/// Shrinks conversations to fit a model's token budget
#[derive(Clone)]
pub struct BudgetTrimmer {
    counter: Arc<TokenCounter>,
}

impl BudgetTrimmer {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Drop the oldest non-pinned messages until the conversation fits
    pub fn trim(
        &self,
        mut conversation: Conversation,
        model_name: &str,
        token_limit: usize,
        max_response_tokens: usize,
    ) -> Result<TrimOutcome> {
        let family = self.counter.family(model_name)?;
        let pinned = pinned_prefix_len(&conversation);

        let costs = conversation
            .iter()
            .map(|m| self.counter.message_cost(m, family))
            .collect::<Result<Vec<_>>>()?;
        let mut message_total: usize = costs.iter().sum();
        let mut used = family.finish(message_total);

        debug!(
            "Token accounting for {}: used={}, reserved={}, limit={}, pinned={}",
            model_name, used, max_response_tokens, token_limit, pinned
        );

        // Everything in pinned..evict_end has been evicted. The next victim is
        // always the first message after the pinned prefix that is still kept.
        let mut evict_end = pinned;
        while used + max_response_tokens >= token_limit {
            if evict_end == conversation.len() {
                return Err(RelayError::BudgetExhausted {
                    pinned_tokens: used,
                    max_response_tokens,
                    token_limit,
                });
            }
            message_total -= costs[evict_end];
            evict_end += 1;
            used = family.finish(message_total);
        }

        let removed = evict_end - pinned;
        if removed > 0 {
            conversation.drain(pinned..evict_end);
            warn!(
                "Evicted {} messages to fit {} budget: used={}, limit={}",
                removed, model_name, used, token_limit
            );
        }

        Ok(TrimOutcome {
            conversation,
            removed,
            used,
        })
    }
}
