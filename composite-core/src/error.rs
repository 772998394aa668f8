use thiserror::Error;

/// Failure reported by a collaborator (record store, environment store, save trigger).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Every way a single resolution attempt can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeError {
    #[error("Invalid configuration JSON: {0}")]
    ConfigParse(String),

    #[error("No configuration provided")]
    ConfigMissing,

    #[error("Record context unavailable (entity id or name missing)")]
    ContextMissing,

    #[error("Environment variable name is empty")]
    EmptyReference,

    #[error("Environment variable '{0}' not found")]
    ReferenceNotFound(String),

    #[error("Environment variable '{0}' has no value or default value")]
    ReferenceEmpty(String),

    #[error("Environment variable '{name}' lookup failed: {source}")]
    Environment {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("'sourcefield' is required when source entity '{source_entity}' differs from '{target_entity}'")]
    MissingJoinField {
        source_entity: String,
        target_entity: String,
    },

    #[error("No fields referenced in rows or formatted output")]
    NoFields,

    #[error("Failed to retrieve record: {0}")]
    Fetch(#[from] StoreError),
}

impl CompositeError {
    /// Message shown on the rendering surface.
    pub fn user_message(&self) -> String {
        match self {
            Self::Fetch(StoreError::NotFound(what)) => format!("Record not found: {what}"),
            other => other.to_string(),
        }
    }

    /// Short stable tag for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "config_parse",
            Self::ConfigMissing => "config_missing",
            Self::ContextMissing => "context_missing",
            Self::EmptyReference => "empty_reference",
            Self::ReferenceNotFound(_) => "reference_not_found",
            Self::ReferenceEmpty(_) => "reference_empty",
            Self::Environment { .. } => "environment",
            Self::MissingJoinField { .. } => "missing_join_field",
            Self::NoFields => "no_fields",
            Self::Fetch(_) => "fetch",
        }
    }
}
