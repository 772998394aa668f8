use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A fetched record: property name → JSON value, as the data store returns it.
pub type Record = Map<String, Value>;

pub const DEFAULT_SEPARATOR: &str = "\n";
pub const DEFAULT_TRUNCATE_WITH: &str = "...";
pub const DEFAULT_TOP: u32 = 1;

// ─── Field parts and rows ─────────────────────────────────────

/// One field reference. Decoration is applied only when the field resolves to a
/// non-empty value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPart {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub fieldname: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub displayname: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub suffix: String,
}

impl FieldPart {
    pub fn new(fieldname: impl Into<String>) -> Self {
        Self {
            fieldname: fieldname.into(),
            ..Default::default()
        }
    }

    pub fn decorated(
        fieldname: impl Into<String>,
        displayname: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            fieldname: fieldname.into(),
            displayname: displayname.into(),
            suffix: suffix.into(),
        }
    }
}

/// One line of composed output.
pub type Row = Vec<FieldPart>;

// ─── Configuration ────────────────────────────────────────────

/// Configuration exactly as written by the form author. Every property is optional;
/// defaults are applied by [`CompositeConfig::from_raw`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawConfig {
    pub source: Option<String>,
    pub sourcefield: Option<String>,
    pub separator: Option<String>,
    #[serde(rename = "truncateWith")]
    pub truncate_with: Option<String>,
    #[serde(default, deserialize_with = "lenient_top")]
    pub top: Option<u32>,
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
    pub rows: Option<Vec<Row>>,
    /// Legacy row shape: each object's values are arrays of parts, first element used.
    pub fields: Option<Vec<Map<String, Value>>>,
    pub formattedoutput: Option<String>,
    #[serde(rename = "autoSave", default, deserialize_with = "lenient_bool")]
    pub auto_save: Option<bool>,
    #[serde(rename = "EnvironmentJson")]
    pub environment_json: Option<String>,
}

/// Resolved configuration for one computation attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeConfig {
    pub source: Option<String>,
    pub source_field: Option<String>,
    pub separator: String,
    pub truncate_with: String,
    pub top: u32,
    pub order_by: Option<String>,
    pub rows: Vec<Row>,
    pub legacy_fields: Vec<Map<String, Value>>,
    pub template: Option<String>,
    pub auto_save: bool,
    pub environment_ref: Option<String>,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

impl CompositeConfig {
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            source: non_blank(raw.source),
            source_field: non_blank(raw.sourcefield),
            separator: raw
                .separator
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
            truncate_with: raw
                .truncate_with
                .unwrap_or_else(|| DEFAULT_TRUNCATE_WITH.to_string()),
            top: raw.top.unwrap_or(DEFAULT_TOP).max(1),
            order_by: non_blank(raw.order_by),
            rows: raw.rows.unwrap_or_default(),
            legacy_fields: raw.fields.unwrap_or_default(),
            template: raw.formattedoutput.filter(|t| !t.trim().is_empty()),
            auto_save: raw.auto_save.unwrap_or(true),
            environment_ref: raw.environment_json,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─── Bound identity ───────────────────────────────────────────

/// Read-only inputs the host binds to the control.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundInputs {
    pub config_raw: Option<String>,
    pub entity_id: Option<String>,
    pub entity_name: Option<String>,
    /// Value currently persisted in the bound field.
    pub bound_value: Option<String>,
}

impl BoundInputs {
    pub fn key(&self) -> RequestKey {
        RequestKey {
            config_raw: self.config_raw.clone(),
            entity_id: self.entity_id.clone(),
            entity_name: self.entity_name.clone(),
        }
    }
}

/// The triple compared against the last computation start to decide whether a new
/// computation is needed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub config_raw: Option<String>,
    pub entity_id: Option<String>,
    pub entity_name: Option<String>,
}

// ─── Environment definitions ──────────────────────────────────

/// External configuration definition as reported by the environment store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    pub id: String,
    #[serde(default)]
    pub default_value: Option<String>,
}

// ─── Lenient deserializers ────────────────────────────────────

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `3`, `3.0` and `"3"`.
fn lenient_top<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| Some(f.clamp(0.0, u32::MAX as f64) as u32))
            .ok_or_else(|| D::Error::custom("top must be a number")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| Some(f.clamp(0.0, u32::MAX as f64) as u32))
            .map_err(|_| D::Error::custom(format!("top must be a number, got '{s}'"))),
        Some(other) => Err(D::Error::custom(format!(
            "top must be a number, got {other}"
        ))),
    }
}

/// Accepts `true`/`false` and their string forms.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!("autoSave must be a boolean, got '{s}'"))),
        },
        Some(other) => Err(D::Error::custom(format!(
            "autoSave must be a boolean, got {other}"
        ))),
    }
}
