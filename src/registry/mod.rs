//! Model registry
//!
//! Per-model deployment configs loaded from a directory of JSON records and
//! republished wholesale on reload.

pub mod model_config;
pub mod store;

pub use model_config::{ModelConfig, ModelRecord};
pub use store::{load_models, ModelRegistry, RegistrySnapshot};
