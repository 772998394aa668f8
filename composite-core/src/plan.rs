//! Query planning: same-entity lookup by id, or a filtered related-entity query.

use serde::Serialize;
use tracing::debug;

use crate::error::CompositeError;
use crate::literal::{encode_literal, strip_braces};
use crate::types::CompositeConfig;

/// Fetch parameters for a related-entity query. `filter` and `order_by` are already
/// percent-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelatedQuery {
    pub select: Vec<String>,
    pub filter: String,
    pub order_by: Option<String>,
    pub top: u32,
}

impl RelatedQuery {
    /// OData-style option string for transport.
    pub fn to_query_options(&self) -> String {
        let mut options = format!("?$select={}&$filter={}", self.select.join(","), self.filter);
        if let Some(order_by) = &self.order_by {
            options.push_str("&$orderby=");
            options.push_str(order_by);
        }
        options.push_str(&format!("&$top={}", self.top));
        options
    }
}

/// How the source record(s) are retrieved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Retrieval {
    /// Same entity: one record by id.
    ById { id: String, select: Vec<String> },
    /// Related entity: filtered, ordered and limited set.
    Related(RelatedQuery),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub target_entity: String,
    pub source_entity: String,
    pub retrieval: Retrieval,
}

impl QueryPlan {
    pub fn select(&self) -> &[String] {
        match &self.retrieval {
            Retrieval::ById { select, .. } => select,
            Retrieval::Related(query) => &query.select,
        }
    }

    pub fn is_same_entity(&self) -> bool {
        matches!(self.retrieval, Retrieval::ById { .. })
    }
}

/// Build the fetch plan for `fields` against the entity bound to the form.
pub fn plan_query(
    config: &CompositeConfig,
    fields: &[String],
    target_entity: &str,
    entity_id: &str,
) -> Result<QueryPlan, CompositeError> {
    let source_entity = config
        .source
        .as_deref()
        .map(str::trim)
        .unwrap_or(target_entity);

    if source_entity.to_lowercase() == target_entity.to_lowercase() {
        debug!(entity = %target_entity, fields = fields.len(), "Planning same-entity fetch");
        return Ok(QueryPlan {
            target_entity: target_entity.to_string(),
            source_entity: target_entity.to_string(),
            retrieval: Retrieval::ById {
                id: strip_braces(entity_id).to_string(),
                select: fields.to_vec(),
            },
        });
    }

    let join_field = config
        .source_field
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| CompositeError::MissingJoinField {
            source_entity: source_entity.to_string(),
            target_entity: target_entity.to_string(),
        })?;

    let filter = format!("{join_field} eq {}", encode_literal(entity_id));
    debug!(
        source = %source_entity,
        target = %target_entity,
        filter = %filter,
        top = config.top,
        "Planning related-entity fetch"
    );

    Ok(QueryPlan {
        target_entity: target_entity.to_string(),
        source_entity: source_entity.to_string(),
        retrieval: Retrieval::Related(RelatedQuery {
            select: fields.to_vec(),
            filter: urlencoding::encode(&filter).into_owned(),
            order_by: config
                .order_by
                .as_deref()
                .map(|order| urlencoding::encode(order).into_owned()),
            top: config.top,
        }),
    })
}
