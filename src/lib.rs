//! Token-budgeted relay for Azure-style chat-completion deployments
//!
//! Callers name a model and hand over a conversation. The relay looks up the
//! deployment, validates sampling parameters, drops the oldest non-system
//! messages until the prompt plus the reserved response fits the model's
//! context window, and forwards the result to the provider.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod relay;

pub use config::Settings;
pub use error::{RelayError, Result};
pub use registry::{ModelConfig, ModelRegistry};
pub use relay::{CallerIdentity, Relay, RelayOutcome, RelayRequest, RelayResult};
