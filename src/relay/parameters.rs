//! Sampling parameter merging and range validation
//!
//! Merge order per field: caller override, then model default, then the
//! relay-wide floor. The merged value is checked against the provider's
//! documented range whichever source it came from.

use crate::context::{Conversation, ConversationMessage, IncomingMessage, Role};
use crate::error::{RelayError, Result};
use crate::registry::ModelConfig;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=2.0;
pub const TOP_P_RANGE: RangeInclusive<f64> = 0.0..=2.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 1..=5000;
pub const NUM_RESULTS_RANGE: RangeInclusive<u32> = 1..=20;
pub const PENALTY_RANGE: RangeInclusive<f64> = -2.0..=2.0;

const DEFAULT_TEMPERATURE: f64 = 1.0;
const DEFAULT_TOP_P: f64 = 1.0;
const DEFAULT_NUM_RESULTS: u32 = 1;
const DEFAULT_PENALTY: f64 = 0.0;

/// Caller-supplied sampling parameters, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOverrides {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default, alias = "num_result")]
    pub num_results: Option<u32>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
}

/// Validated parameters for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParameters {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub num_results: u32,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
}

/// Merges overrides with model defaults and enforces ranges
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterValidator;

impl ParameterValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        overrides: &SamplingOverrides,
        config: &ModelConfig,
    ) -> Result<EffectiveParameters> {
        // The model's response allowance is its default completion size
        let model_max_tokens = u32::try_from(config.max_response_tokens).unwrap_or(u32::MAX);

        Ok(EffectiveParameters {
            temperature: check_f64(
                "temperature",
                overrides.temperature.or(config.default_temperature).unwrap_or(DEFAULT_TEMPERATURE),
                TEMPERATURE_RANGE,
            )?,
            top_p: check_f64(
                "top_p",
                overrides.top_p.or(config.default_top_p).unwrap_or(DEFAULT_TOP_P),
                TOP_P_RANGE,
            )?,
            max_tokens: check_u32(
                "max_tokens",
                overrides.max_tokens.unwrap_or(model_max_tokens),
                MAX_TOKENS_RANGE,
            )?,
            num_results: check_u32(
                "num_results",
                overrides.num_results.or(config.default_num_results).unwrap_or(DEFAULT_NUM_RESULTS),
                NUM_RESULTS_RANGE,
            )?,
            presence_penalty: check_f64(
                "presence_penalty",
                overrides
                    .presence_penalty
                    .or(config.default_presence_penalty)
                    .unwrap_or(DEFAULT_PENALTY),
                PENALTY_RANGE,
            )?,
            frequency_penalty: check_f64(
                "frequency_penalty",
                overrides
                    .frequency_penalty
                    .or(config.default_frequency_penalty)
                    .unwrap_or(DEFAULT_PENALTY),
                PENALTY_RANGE,
            )?,
        })
    }

    /// Check that every message has a known role and content
    pub fn validate_conversation(&self, messages: &[IncomingMessage]) -> Result<Conversation> {
        if messages.is_empty() {
            return Err(RelayError::MalformedConversation {
                index: 0,
                reason: "conversation is empty".to_string(),
            });
        }

        messages
            .iter()
            .enumerate()
            .map(|(index, message)| -> Result<ConversationMessage> {
                let malformed = |reason: String| RelayError::MalformedConversation { index, reason };

                let role = message
                    .role
                    .as_deref()
                    .ok_or_else(|| malformed("'role' is required".to_string()))?;
                let role = Role::parse(role)
                    .ok_or_else(|| malformed(format!("unknown role '{}'", role)))?;
                let content = message
                    .content
                    .as_ref()
                    .ok_or_else(|| malformed("'content' is required".to_string()))?;

                Ok(ConversationMessage::new(role, content.clone()))
            })
            .collect()
    }
}

fn check_f64(field: &'static str, value: f64, range: RangeInclusive<f64>) -> Result<f64> {
    // NaN fails `contains` and is rejected here
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(RelayError::ParameterRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn check_u32(field: &'static str, value: u32, range: RangeInclusive<u32>) -> Result<u32> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(RelayError::ParameterRange {
            field,
            value: value as f64,
            min: *range.start() as f64,
            max: *range.end() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> ModelConfig {
        ModelConfig {
            name: "gpt-4".to_string(),
            endpoint_base: "https://example.openai.azure.com".to_string(),
            api_version: "2023-03-15-preview".to_string(),
            deployment_name: "gpt4".to_string(),
            credential: SecretString::new("k".to_string()),
            token_limit: 8192,
            max_response_tokens: 800,
            default_temperature: None,
            default_top_p: None,
            default_num_results: None,
            default_presence_penalty: None,
            default_frequency_penalty: None,
        }
    }

    fn with_temperature(value: f64) -> SamplingOverrides {
        SamplingOverrides {
            temperature: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn test_floor_defaults() {
        let params = ParameterValidator::new()
            .validate(&SamplingOverrides::default(), &config())
            .unwrap();
        assert_eq!(
            params,
            EffectiveParameters {
                temperature: 1.0,
                top_p: 1.0,
                max_tokens: 800,
                num_results: 1,
                presence_penalty: 0.0,
                frequency_penalty: 0.0,
            }
        );
    }

    #[test]
    fn test_model_allowance_is_range_checked() {
        let mut config = config();
        config.max_response_tokens = 10_000;
        let err = ParameterValidator::new()
            .validate(&SamplingOverrides::default(), &config)
            .unwrap_err();
        assert!(matches!(err, RelayError::ParameterRange { field: "max_tokens", .. }));
    }

    #[test]
    fn test_temperature_bounds() {
        let validator = ParameterValidator::new();
        let config = config();

        let params = validator.validate(&with_temperature(2.0), &config).unwrap();
        assert_eq!(params.temperature, 2.0);

        match validator.validate(&with_temperature(2.1), &config) {
            Err(RelayError::ParameterRange { field, value, min, max }) => {
                assert_eq!(field, "temperature");
                assert_eq!(value, 2.1);
                assert_eq!(min, 0.0);
                assert_eq!(max, 2.0);
            }
            other => panic!("expected ParameterRange, got {:?}", other),
        }

        assert!(validator.validate(&with_temperature(-0.1), &config).is_err());
        assert!(validator.validate(&with_temperature(f64::NAN), &config).is_err());
    }

    #[test]
    fn test_merge_order() {
        let validator = ParameterValidator::new();
        let mut config = config();
        config.default_top_p = Some(0.5);

        let params = validator.validate(&SamplingOverrides::default(), &config).unwrap();
        assert_eq!(params.top_p, 0.5);

        let overrides = SamplingOverrides {
            top_p: Some(0.9),
            ..Default::default()
        };
        let params = validator.validate(&overrides, &config).unwrap();
        assert_eq!(params.top_p, 0.9);
    }

    #[test]
    fn test_each_field_reports_itself() {
        let validator = ParameterValidator::new();
        let config = config();
        let cases = [
            (SamplingOverrides { top_p: Some(2.5), ..Default::default() }, "top_p"),
            (SamplingOverrides { max_tokens: Some(0), ..Default::default() }, "max_tokens"),
            (SamplingOverrides { max_tokens: Some(5001), ..Default::default() }, "max_tokens"),
            (SamplingOverrides { num_results: Some(21), ..Default::default() }, "num_results"),
            (SamplingOverrides { presence_penalty: Some(-2.5), ..Default::default() }, "presence_penalty"),
            (SamplingOverrides { frequency_penalty: Some(3.0), ..Default::default() }, "frequency_penalty"),
        ];
        for (overrides, expected) in cases {
            match validator.validate(&overrides, &config) {
                Err(RelayError::ParameterRange { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {} to be rejected, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_inclusive_edges_accepted() {
        let overrides = SamplingOverrides {
            temperature: Some(0.0),
            top_p: Some(2.0),
            max_tokens: Some(5000),
            num_results: Some(20),
            presence_penalty: Some(-2.0),
            frequency_penalty: Some(2.0),
        };
        assert!(ParameterValidator::new().validate(&overrides, &config()).is_ok());
    }

    #[test]
    fn test_overrides_accept_num_result_alias() {
        let overrides: SamplingOverrides = serde_json::from_str(r#"{"num_result": 3}"#).unwrap();
        assert_eq!(overrides.num_results, Some(3));
    }

    #[test]
    fn test_valid_conversation() {
        let messages = vec![
            IncomingMessage::new("system", "be brief"),
            IncomingMessage::new("user", "hi"),
        ];
        let conversation = ParameterValidator::new()
            .validate_conversation(&messages)
            .unwrap();
        assert_eq!(
            conversation,
            vec![
                ConversationMessage::system("be brief"),
                ConversationMessage::user("hi"),
            ]
        );
    }

    #[test]
    fn test_missing_content() {
        let messages = vec![
            IncomingMessage::new("user", "hi"),
            IncomingMessage {
                role: Some("user".to_string()),
                content: None,
            },
        ];
        match ParameterValidator::new().validate_conversation(&messages) {
            Err(RelayError::MalformedConversation { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("content"));
            }
            other => panic!("expected MalformedConversation, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_or_unknown_role() {
        let validator = ParameterValidator::new();
        let missing = vec![IncomingMessage {
            role: None,
            content: Some("hi".to_string()),
        }];
        assert!(matches!(
            validator.validate_conversation(&missing),
            Err(RelayError::MalformedConversation { index: 0, .. })
        ));

        let unknown = vec![IncomingMessage::new("tool", "hi")];
        assert!(matches!(
            validator.validate_conversation(&unknown),
            Err(RelayError::MalformedConversation { .. })
        ));
    }

    #[test]
    fn test_empty_conversation() {
        assert!(matches!(
            ParameterValidator::new().validate_conversation(&[]),
            Err(RelayError::MalformedConversation { .. })
        ));
    }
}
