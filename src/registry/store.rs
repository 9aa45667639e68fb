//! Model registry with atomic snapshot publication
//!
//! Readers clone an `Arc` to the current snapshot and keep using it for the
//! rest of their request. A reload builds a complete new snapshot before
//! taking the write lock, so the lock only ever guards a pointer swap and
//! no reader can observe a half-loaded registry.

use super::model_config::{ModelConfig, ModelRecord};
use crate::context::TokenCounter;
use crate::error::{RelayError, Result};
use crate::metrics::METRICS;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// One published generation of model configs
#[derive(Debug)]
pub struct RegistrySnapshot {
    pub generation: u64,
    models: HashMap<String, Arc<ModelConfig>>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<Arc<ModelConfig>> {
        self.models.get(name).cloned()
    }

    /// Model names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Owns all model configs, reloadable from a directory of JSON records
pub struct ModelRegistry {
    source: PathBuf,
    counter: Arc<TokenCounter>,
    published: RwLock<Arc<RegistrySnapshot>>,
}

impl ModelRegistry {
    /// Load the registry from `source`, failing if the directory is unusable
    pub fn load(source: impl Into<PathBuf>, counter: Arc<TokenCounter>) -> Result<Self> {
        let source = source.into();
        let models = load_models(&source, &counter)?;
        info!(
            "Loaded {} model configs from {}",
            models.len(),
            source.display()
        );

        Ok(Self {
            source,
            counter,
            published: RwLock::new(Arc::new(RegistrySnapshot {
                generation: 1,
                models,
            })),
        })
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        // The guarded value is a single Arc, a poisoned lock cannot hold a torn state
        let guard = self.published.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Re-read the source and publish it; on failure the old snapshot stays live
    pub fn reload(&self) -> Result<Vec<String>> {
        let models = match load_models(&self.source, &self.counter) {
            Ok(models) => models,
            Err(e) => {
                METRICS.record_reload(false);
                error!("Model registry reload failed, keeping previous snapshot: {}", e);
                return Err(e);
            }
        };

        let snapshot = {
            let mut guard = self.published.write().unwrap_or_else(|e| e.into_inner());
            let next = Arc::new(RegistrySnapshot {
                generation: guard.generation + 1,
                models,
            });
            *guard = Arc::clone(&next);
            next
        };

        METRICS.record_reload(true);
        info!(
            "Published model registry generation {} with {} models",
            snapshot.generation,
            snapshot.len()
        );
        Ok(snapshot.names())
    }

    /// Resolve a model config from the current snapshot
    pub fn resolve(&self, name: &str) -> Result<Arc<ModelConfig>> {
        self.snapshot().get(name).ok_or_else(|| {
            RelayError::UnsupportedModel(format!(
                "{} is not supported, please contact your administrator",
                name
            ))
        })
    }

    /// Names of all published models
    pub fn list_models(&self) -> Vec<String> {
        self.snapshot().names()
    }
}

/// Parse every `*.json` record in `source`; later files win on duplicate names
pub fn load_models(
    source: &Path,
    counter: &TokenCounter,
) -> Result<HashMap<String, Arc<ModelConfig>>> {
    if !source.is_dir() {
        return Err(RelayError::Config(format!(
            "model config directory {} not found",
            source.display()
        )));
    }

    let dir = source.to_str().ok_or_else(|| {
        RelayError::Config(format!("non UTF-8 config path {}", source.display()))
    })?;
    // Metacharacters in the directory name must match literally
    let pattern = format!("{}/*.json", glob::Pattern::escape(dir.trim_end_matches('/')));

    let mut paths = glob::glob(&pattern)
        .map_err(|e| RelayError::Config(format!("invalid config pattern: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RelayError::Config(format!("failed to list model configs: {}", e)))?;
    paths.sort();

    let mut models = HashMap::new();
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            RelayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let record: ModelRecord = serde_json::from_str(&raw).map_err(|e| {
            RelayError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let config = record.into_config(counter, &path)?;

        debug!("Loaded model {} from {}", config.name, path.display());
        let name = config.name.clone();
        if models.insert(name.clone(), Arc::new(config)).is_some() {
            warn!(
                "Duplicate model {}, {} overrides the earlier record",
                name,
                path.display()
            );
        }
    }

    if models.is_empty() {
        warn!("No model configs found in {}", source.display());
    }
    Ok(models)
}
