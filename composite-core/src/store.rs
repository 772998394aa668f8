use crate::error::StoreError;
use crate::plan::RelatedQuery;
use crate::types::{EnvironmentDefinition, Record};
use async_trait::async_trait;

/// Record retrieval. The engine reads source records exclusively through this trait,
/// so the host data API, a test double or a fixture file can back it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record of `entity` by id, selecting `select`.
    async fn fetch_one(&self, entity: &str, id: &str, select: &[String])
        -> Result<Record, StoreError>;

    /// Fetch the records of `entity` matching a planned related query.
    async fn fetch_many(&self, entity: &str, query: &RelatedQuery)
        -> Result<Vec<Record>, StoreError>;
}

/// Externally stored configuration (environment variable definitions and values).
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn lookup_definition(&self, name: &str)
        -> Result<Option<EnvironmentDefinition>, StoreError>;

    async fn lookup_current_value(&self, definition_id: &str)
        -> Result<Option<String>, StoreError>;
}

/// Field metadata of the bound output field.
pub trait FieldMetadata: Send + Sync {
    /// Maximum length of `bound_field`, if the host reports one.
    fn max_length(&self, bound_field: &str) -> Option<i64>;
}

/// Form save. Best-effort: failures are logged, never escalated.
#[async_trait]
pub trait SaveTrigger: Send + Sync {
    async fn save(&self) -> Result<(), StoreError>;
}
