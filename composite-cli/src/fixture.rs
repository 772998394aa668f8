//! Fixture files: a bound entity, its composition config and the data it reads.

use anyhow::{Context, Result};
use composite_core::store_memory::{MemoryEnvironmentStore, MemoryRecordStore, StaticFieldMetadata};
use composite_core::{BoundInputs, ControlSettings, Record};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub entity: BoundEntity,
    /// Configuration JSON, either as a string or inline.
    pub config: Value,
    #[serde(default)]
    pub records: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    pub environment: BTreeMap<String, EnvironmentVariable>,
}

#[derive(Debug, Deserialize)]
pub struct BoundEntity {
    pub name: String,
    pub id: String,
    pub field: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub max_length: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnvironmentVariable {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
}

impl Fixture {
    /// Load a `.json`, `.yaml` or `.yml` fixture.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        } else {
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
    }

    pub fn config_raw(&self) -> String {
        match &self.config {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }

    pub fn inputs(&self) -> BoundInputs {
        BoundInputs {
            config_raw: Some(self.config_raw()),
            entity_id: Some(self.entity.id.clone()),
            entity_name: Some(self.entity.name.clone()),
            bound_value: self.entity.value.clone(),
        }
    }

    pub fn settings(&self, auto_save_delay_ms: u64) -> ControlSettings {
        ControlSettings {
            bound_field: self.entity.field.clone(),
            auto_save_delay_ms,
        }
    }

    pub fn record_store(&self) -> MemoryRecordStore {
        let mut store = MemoryRecordStore::new();
        for (entity, records) in &self.records {
            for record in records {
                store.insert(entity, record.clone());
            }
        }
        store
    }

    pub fn environment_store(&self) -> MemoryEnvironmentStore {
        let mut store = MemoryEnvironmentStore::new();
        for (name, variable) in &self.environment {
            store.define(name, variable.default.as_deref(), variable.current.as_deref());
        }
        store
    }

    pub fn metadata(&self) -> StaticFieldMetadata {
        match self.entity.max_length {
            Some(max) => StaticFieldMetadata::new().with_max_length(&self.entity.field, max),
            None => StaticFieldMetadata::new(),
        }
    }
}
