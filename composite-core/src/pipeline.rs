//! One resolution attempt: config → rows/fields → plan → fetch → compose → truncate.

use std::sync::Arc;
use tracing::debug;

use crate::builder::{build_composite, build_composite_many};
use crate::error::CompositeError;
use crate::plan::{plan_query, QueryPlan, Retrieval};
use crate::resolver::ConfigResolver;
use crate::rows::{collect_field_names, normalize_rows};
use crate::store::{EnvironmentStore, FieldMetadata, RecordStore};
use crate::truncate::truncate;
use crate::types::BoundInputs;

/// Output of a successful resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub value: String,
    pub auto_save: bool,
    pub plan: QueryPlan,
}

pub struct ResolutionPipeline {
    resolver: ConfigResolver,
    records: Arc<dyn RecordStore>,
    metadata: Arc<dyn FieldMetadata>,
    bound_field: String,
}

impl ResolutionPipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        environment: Arc<dyn EnvironmentStore>,
        metadata: Arc<dyn FieldMetadata>,
        bound_field: impl Into<String>,
    ) -> Self {
        Self {
            resolver: ConfigResolver::new(environment),
            records,
            metadata,
            bound_field: bound_field.into(),
        }
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub async fn compute(&self, inputs: &BoundInputs) -> Result<Composition, CompositeError> {
        let raw = non_blank(inputs.config_raw.as_deref()).ok_or(CompositeError::ConfigMissing)?;
        let entity_id =
            non_blank(inputs.entity_id.as_deref()).ok_or(CompositeError::ContextMissing)?;
        let entity_name =
            non_blank(inputs.entity_name.as_deref()).ok_or(CompositeError::ContextMissing)?;

        let config = self.resolver.resolve(raw).await?;
        let rows = normalize_rows(&config.rows, &config.legacy_fields);
        let template = config.template.as_deref();
        let fields = collect_field_names(&rows, template)?;
        let plan = plan_query(&config, &fields, entity_name, entity_id)?;

        let rendered = match &plan.retrieval {
            Retrieval::ById { id, select } => {
                let record = self
                    .records
                    .fetch_one(&plan.source_entity, id, select)
                    .await?;
                build_composite(&record, &rows, template, &config.separator)
            }
            Retrieval::Related(query) => {
                let records = self.records.fetch_many(&plan.source_entity, query).await?;
                debug!(count = records.len(), source = %plan.source_entity, "Related records fetched");
                build_composite_many(&records, &rows, template, &config.separator)
            }
        };

        let max_length = self.metadata.max_length(&self.bound_field);
        let value = truncate(&rendered, max_length, &config.truncate_with);

        Ok(Composition {
            value,
            auto_save: config.auto_save,
            plan,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
