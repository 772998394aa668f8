//! Configuration resolution, including indirection through an environment variable
//! that holds the effective configuration JSON.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{CompositeError, StoreError};
use crate::store::EnvironmentStore;
use crate::types::{CompositeConfig, RawConfig};

/// Configuration property naming the environment variable to merge in.
pub const ENVIRONMENT_KEY: &str = "EnvironmentJson";

/// Resolved environment JSON per reference name.
///
/// Entries live until [`clear`](Self::clear). Each clear bumps a generation so that a
/// lookup started before the clear cannot repopulate the cache afterwards.
#[derive(Debug, Default)]
pub struct EnvironmentCache {
    entries: HashMap<String, String>,
    generation: u64,
}

impl EnvironmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Store `text` unless the cache was cleared since `generation` was read.
    pub fn insert_if_current(&mut self, generation: u64, name: &str, text: String) -> bool {
        if generation != self.generation {
            return false;
        }
        self.entries.insert(name.to_string(), text);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ConfigResolver {
    environment: Arc<dyn EnvironmentStore>,
    cache: Mutex<EnvironmentCache>,
}

impl ConfigResolver {
    pub fn new(environment: Arc<dyn EnvironmentStore>) -> Self {
        Self {
            environment,
            cache: Mutex::new(EnvironmentCache::new()),
        }
    }

    /// Parse `raw` and merge in the referenced environment configuration, if any.
    ///
    /// Environment properties override same-named inline properties; inline-only
    /// properties still apply.
    pub async fn resolve(&self, raw: &str) -> Result<CompositeConfig, CompositeError> {
        let mut merged = parse_object(raw)?;

        let reference = match merged.remove(ENVIRONMENT_KEY) {
            Some(Value::String(name)) if !name.is_empty() => Some(name),
            _ => None,
        };

        if let Some(name) = &reference {
            let text = self.environment_text(name).await?;
            let mut external = parse_object(&text)?;
            external.remove(ENVIRONMENT_KEY);
            for (key, value) in external {
                merged.insert(key, value);
            }
        }

        let raw_config: RawConfig = serde_json::from_value(Value::Object(merged))
            .map_err(|e| CompositeError::ConfigParse(e.to_string()))?;
        let mut config = CompositeConfig::from_raw(raw_config);
        config.environment_ref = reference;
        Ok(config)
    }

    /// Forget every cached environment value.
    pub fn clear_cache(&self) {
        let mut cache = self.cache();
        debug!(entries = cache.len(), "Clearing environment config cache");
        cache.clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache().len()
    }

    async fn environment_text(&self, name: &str) -> Result<String, CompositeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CompositeError::EmptyReference);
        }

        let generation = {
            let cache = self.cache();
            if let Some(text) = cache.get(name) {
                debug!(name = %name, "Environment config served from cache");
                return Ok(text.to_string());
            }
            cache.generation()
        };

        let lookup_failed = |source: StoreError| CompositeError::Environment {
            name: name.to_string(),
            source,
        };

        let definition = self
            .environment
            .lookup_definition(name)
            .await
            .map_err(lookup_failed)?
            .ok_or_else(|| CompositeError::ReferenceNotFound(name.to_string()))?;

        let current = self
            .environment
            .lookup_current_value(&definition.id)
            .await
            .map_err(lookup_failed)?;

        let text = current
            .filter(|v| !v.trim().is_empty())
            .or_else(|| definition.default_value.filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| CompositeError::ReferenceEmpty(name.to_string()))?;

        let cached = self
            .cache()
            .insert_if_current(generation, name, text.clone());
        debug!(name = %name, cached, "Environment config fetched");
        Ok(text)
    }

    fn cache(&self) -> MutexGuard<'_, EnvironmentCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, CompositeError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CompositeError::ConfigParse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(CompositeError::ConfigParse(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
