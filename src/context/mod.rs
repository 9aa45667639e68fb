//! Conversation context and token budget enforcement
//!
//! Token accounting follows the provider's chat framing: every message pays a
//! family-specific fixed overhead on top of its content tokens, and the reply
//! is primed once per request.

pub mod models;
pub mod token_budget;
pub mod token_counter;
pub mod token_estimator;

pub use models::{pinned_prefix_len, Conversation, ConversationMessage, IncomingMessage, Role};
pub use token_budget::{BudgetTrimmer, TrimOutcome};
pub use token_counter::{builtin_families, ModelFamily, TokenCounter};
pub use token_estimator::{TiktokenEstimator, TokenEstimator, WordBasedEstimator, CL100K_BASE};
