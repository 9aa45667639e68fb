//! Process settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file (`relay.toml`, or the path in `RELAY_CONFIG`), then
//! `RELAY__SECTION__KEY` environment variables.

use crate::context::ModelFamily;
use crate::error::{RelayError, Result};
use crate::relay::DispatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Relay process settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub models: ModelSettings,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Token families registered on top of the built-in ones
    #[serde(default)]
    pub families: Vec<ModelFamily>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body limit in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Directory of per-model JSON records
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Fallback filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./keys")
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings from `RELAY_CONFIG` (or `relay.toml`) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load settings from `path` if it exists, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RelayError::Config(format!("failed to load settings: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| RelayError::Config(format!("invalid settings: {}", e)))
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timeout: Duration::from_millis(self.provider.timeout_ms),
            connect_timeout: Duration::from_millis(self.provider.connect_timeout_ms),
        }
    }
}
