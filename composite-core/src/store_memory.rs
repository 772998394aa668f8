//! In-memory collaborators for tests and the fixture-driven CLI.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;
use crate::extract::{stringify, FORMATTED_VALUE_SUFFIX};
use crate::literal::strip_braces;
use crate::plan::RelatedQuery;
use crate::store::{EnvironmentStore, FieldMetadata, RecordStore, SaveTrigger};
use crate::types::{EnvironmentDefinition, Record};

// ─── Records ──────────────────────────────────────────────────

/// Records per entity. The primary key of entity `x` is the property `xid`.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: HashMap<String, Vec<Record>>,
    fetches: AtomicUsize,
    failure: Mutex<Option<StoreError>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: &str, record: Record) {
        self.records
            .entry(entity.to_lowercase())
            .or_default()
            .push(record);
    }

    pub fn with_record(mut self, entity: &str, record: Record) -> Self {
        self.insert(entity, record);
        self
    }

    /// Number of `fetch_one` + `fetch_many` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    /// Make every subsequent fetch fail with `error` (or succeed again with `None`).
    pub fn set_failure(&self, error: Option<StoreError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn begin_fetch(&self) -> Result<(), StoreError> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        match &*self.failure.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn entity_records(&self, entity: &str) -> &[Record] {
        self.records
            .get(&entity.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_one(
        &self,
        entity: &str,
        id: &str,
        select: &[String],
    ) -> Result<Record, StoreError> {
        self.begin_fetch()?;
        let key = format!("{}id", entity.to_lowercase());
        let id = strip_braces(id);
        self.entity_records(entity)
            .iter()
            .find(|record| {
                record
                    .get(&key)
                    .is_some_and(|v| stringify(v).eq_ignore_ascii_case(id))
            })
            .map(|record| project(record, select))
            .ok_or_else(|| StoreError::NotFound(format!("{entity}({id})")))
    }

    async fn fetch_many(
        &self,
        entity: &str,
        query: &RelatedQuery,
    ) -> Result<Vec<Record>, StoreError> {
        self.begin_fetch()?;
        let filter = FilterExpr::parse(&decode(&query.filter)?)?;
        let order = match &query.order_by {
            Some(order_by) => parse_order(&decode(order_by)?),
            None => Vec::new(),
        };

        let mut matched: Vec<&Record> = self
            .entity_records(entity)
            .iter()
            .filter(|record| filter.matches(record))
            .collect();
        matched.sort_by(|a, b| compare_records(a, b, &order));

        Ok(matched
            .into_iter()
            .take(query.top as usize)
            .map(|record| project(record, &query.select))
            .collect())
    }
}

/// Keep only selected properties and their formatted counterparts.
fn project(record: &Record, select: &[String]) -> Record {
    record
        .iter()
        .filter(|(key, _)| {
            let base = key.split_once('@').map_or(key.as_str(), |(base, _)| base);
            select.iter().any(|field| field == base)
                && (base == key.as_str() || key.ends_with(FORMATTED_VALUE_SUFFIX))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn decode(encoded: &str) -> Result<String, StoreError> {
    urlencoding::decode(encoded)
        .map(|s| s.into_owned())
        .map_err(|e| StoreError::Backend(format!("invalid query encoding: {e}")))
}

/// `<field> eq <literal>`, the only filter shape the planner emits.
struct FilterExpr {
    field: String,
    literal: Literal,
}

enum Literal {
    Quoted(String),
    Bare(String),
}

impl FilterExpr {
    fn parse(text: &str) -> Result<Self, StoreError> {
        let (field, literal) = text
            .split_once(" eq ")
            .ok_or_else(|| StoreError::Backend(format!("unsupported filter: {text}")))?;
        let literal = literal.trim();
        let literal = match literal
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            Some(inner) => Literal::Quoted(inner.replace("''", "'")),
            None => Literal::Bare(literal.to_string()),
        };
        Ok(Self {
            field: field.trim().to_string(),
            literal,
        })
    }

    fn matches(&self, record: &Record) -> bool {
        let Some(value) = record.get(&self.field).filter(|v| !v.is_null()) else {
            return false;
        };
        let actual = stringify(value);
        match &self.literal {
            Literal::Quoted(expected) => &actual == expected,
            Literal::Bare(expected) => actual.eq_ignore_ascii_case(expected),
        }
    }
}

fn parse_order(text: &str) -> Vec<(String, bool)> {
    text.split(',')
        .filter_map(|clause| {
            let mut words = clause.split_whitespace();
            let field = words.next()?.to_string();
            let descending = words
                .next()
                .is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
            Some((field, descending))
        })
        .collect()
}

fn compare_records(a: &Record, b: &Record, order: &[(String, bool)]) -> Ordering {
    for (field, descending) in order {
        let ordering = compare_values(a.get(field), b.get(field));
        let ordering = if *descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Nulls sort first; numbers numerically; everything else by display text.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => stringify(x).cmp(&stringify(y)),
    }
}

// ─── Environment ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryEnvironmentStore {
    definitions: HashMap<String, EnvironmentDefinition>,
    values: Mutex<HashMap<String, String>>,
    lookups: AtomicUsize,
}

impl MemoryEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition named `name` with an optional default and current value.
    pub fn define(&mut self, name: &str, default_value: Option<&str>, current: Option<&str>) {
        let id = format!("envdef-{name}");
        self.definitions.insert(
            name.to_string(),
            EnvironmentDefinition {
                id: id.clone(),
                default_value: default_value.map(str::to_string),
            },
        );
        if let Some(current) = current {
            self.values_mut().insert(id, current.to_string());
        }
    }

    /// Change the current value of an existing definition.
    pub fn set_current_value(&self, name: &str, value: &str) {
        if let Some(definition) = self.definitions.get(name) {
            self.values()
                .insert(definition.id.clone(), value.to_string());
        }
    }

    /// Number of definition lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(AtomicOrdering::SeqCst)
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn values_mut(&mut self) -> &mut HashMap<String, String> {
        self.values.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EnvironmentStore for MemoryEnvironmentStore {
    async fn lookup_definition(
        &self,
        name: &str,
    ) -> Result<Option<EnvironmentDefinition>, StoreError> {
        self.lookups.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.definitions.get(name).cloned())
    }

    async fn lookup_current_value(
        &self,
        definition_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.values().get(definition_id).cloned())
    }
}

// ─── Field metadata ───────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct StaticFieldMetadata {
    max_lengths: HashMap<String, i64>,
}

impl StaticFieldMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(mut self, field: &str, max_length: i64) -> Self {
        self.max_lengths.insert(field.to_string(), max_length);
        self
    }
}

impl FieldMetadata for StaticFieldMetadata {
    fn max_length(&self, bound_field: &str) -> Option<i64> {
        self.max_lengths.get(bound_field).copied()
    }
}

// ─── Save trigger ─────────────────────────────────────────────

/// Counts save invocations; can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingSaveTrigger {
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingSaveTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(AtomicOrdering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl SaveTrigger for RecordingSaveTrigger {
    async fn save(&self) -> Result<(), StoreError> {
        self.saves.fetch_add(1, AtomicOrdering::SeqCst);
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Backend("save rejected".to_string()));
        }
        Ok(())
    }
}
