//! Per-model configuration records

use crate::context::TokenCounter;
use crate::error::{RelayError, Result};
use crate::relay::{ParameterValidator, SamplingOverrides};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

/// Published, immutable configuration for one model deployment
#[derive(Debug)]
pub struct ModelConfig {
    pub name: String,
    pub endpoint_base: String,
    pub api_version: String,
    pub deployment_name: String,
    /// Provider API key, never logged or serialized
    pub credential: SecretString,
    pub token_limit: usize,
    pub max_response_tokens: usize,
    pub default_temperature: Option<f64>,
    pub default_top_p: Option<f64>,
    pub default_num_results: Option<u32>,
    pub default_presence_penalty: Option<f64>,
    pub default_frequency_penalty: Option<f64>,
}

/// On-disk model record, one JSON file per model
///
/// Field names follow the relay's key files (`model_name`, `api_base`,
/// `api_key`, `num_result`); the descriptive names are accepted as aliases.
#[derive(Debug, Deserialize)]
pub struct ModelRecord {
    #[serde(default, alias = "name")]
    pub model_name: Option<String>,

    #[serde(default, alias = "endpoint_base")]
    pub api_base: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub deployment_name: Option<String>,

    #[serde(default, alias = "credential")]
    pub api_key: Option<SecretString>,

    /// Falls back to the model family's context window
    #[serde(default)]
    pub token_limit: Option<usize>,

    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub top_p: Option<f64>,

    #[serde(default, alias = "num_results")]
    pub num_result: Option<u32>,

    #[serde(default)]
    pub presence_penalty: Option<f64>,

    #[serde(default)]
    pub frequency_penalty: Option<f64>,
}

fn default_api_version() -> String {
    "2023-03-15-preview".to_string()
}

fn default_max_response_tokens() -> usize {
    2000
}

fn required<T>(value: Option<T>, field: &str, source: &Path) -> Result<T> {
    value.ok_or_else(|| {
        RelayError::Config(format!(
            "{}: required field '{}' is missing",
            source.display(),
            field
        ))
    })
}

fn non_empty(value: String, field: &str, source: &Path) -> Result<String> {
    if value.trim().is_empty() {
        return Err(RelayError::Config(format!(
            "{}: field '{}' is empty",
            source.display(),
            field
        )));
    }
    Ok(value)
}

impl ModelRecord {
    /// Validate the record and turn it into a publishable config
    pub fn into_config(self, counter: &TokenCounter, source: &Path) -> Result<ModelConfig> {
        let name = non_empty(required(self.model_name, "model_name", source)?, "model_name", source)?;
        let endpoint_base = non_empty(required(self.api_base, "api_base", source)?, "api_base", source)?;
        let deployment_name = non_empty(
            required(self.deployment_name, "deployment_name", source)?,
            "deployment_name",
            source,
        )?;
        let credential = required(self.api_key, "api_key", source)?;

        let family = counter.family(&name).map_err(|_| {
            RelayError::Config(format!(
                "{}: model {} matches no known token family",
                source.display(),
                name
            ))
        })?;
        let token_limit = self.token_limit.unwrap_or(family.default_token_limit);

        if token_limit == 0 || self.max_response_tokens == 0 {
            return Err(RelayError::Config(format!(
                "{}: token_limit and max_response_tokens must be positive",
                source.display()
            )));
        }
        if token_limit <= self.max_response_tokens {
            return Err(RelayError::Config(format!(
                "{}: token_limit ({}) must exceed max_response_tokens ({})",
                source.display(),
                token_limit,
                self.max_response_tokens
            )));
        }

        let config = ModelConfig {
            name,
            endpoint_base,
            api_version: self.api_version,
            deployment_name,
            credential,
            token_limit,
            max_response_tokens: self.max_response_tokens,
            default_temperature: self.temperature,
            default_top_p: self.top_p,
            default_num_results: self.num_result,
            default_presence_penalty: self.presence_penalty,
            default_frequency_penalty: self.frequency_penalty,
        };

        // Defaults are what every request without overrides runs with
        ParameterValidator::new()
            .validate(&SamplingOverrides::default(), &config)
            .map_err(|e| {
                RelayError::Config(format!("{}: invalid model default: {}", source.display(), e))
            })?;

        Ok(config)
    }
}
