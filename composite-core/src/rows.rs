//! Row normalization and field reference collection.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::error::CompositeError;
use crate::types::{FieldPart, Row};

/// `{{identifier}}` placeholder in an output template.
pub(crate) static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap());

/// Convert either accepted row shape into canonical rows.
///
/// Canonical `rows` win when non-empty. Legacy `fields` objects become one row each,
/// using the first part under every key.
pub fn normalize_rows(rows: &[Row], legacy: &[Map<String, Value>]) -> Vec<Row> {
    if !rows.is_empty() {
        return rows.to_vec();
    }

    legacy
        .iter()
        .map(|object| {
            object
                .values()
                .filter_map(|parts| parts.as_array()?.first())
                .filter_map(legacy_part)
                .collect::<Row>()
        })
        .filter(|row| !row.is_empty())
        .collect()
}

fn legacy_part(value: &Value) -> Option<FieldPart> {
    let object = value.as_object()?;
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(FieldPart {
        fieldname: text("fieldname"),
        displayname: text("displayname"),
        suffix: text("suffix"),
    })
}

/// Placeholder names in `template`, in order of appearance (duplicates kept).
pub fn template_placeholders(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Distinct field names referenced by the template and rows, first-seen order.
pub fn collect_field_names(
    rows: &[Row],
    template: Option<&str>,
) -> Result<Vec<String>, CompositeError> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    let from_template = template.into_iter().flat_map(template_placeholders);
    let from_rows = rows
        .iter()
        .flatten()
        .map(|part| part.fieldname.as_str())
        .filter(|name| !name.is_empty());

    for name in from_template.chain(from_rows) {
        if seen.insert(name) {
            names.push(name.to_string());
        }
    }

    if names.is_empty() {
        return Err(CompositeError::NoFields);
    }
    Ok(names)
}

/// First row part decorating `field`, if any.
pub fn find_decoration<'a>(rows: &'a [Row], field: &str) -> Option<&'a FieldPart> {
    rows.iter().flatten().find(|part| part.fieldname == field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawConfig;
    use serde_json::json;

    fn raw(value: Value) -> RawConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn legacy_fields_normalize_to_single_part_row() {
        let config = raw(json!({ "fields": [{ "k": [{ "fieldname": "name" }] }] }));
        let rows = normalize_rows(&[], config.fields.as_deref().unwrap());
        assert_eq!(rows, vec![vec![FieldPart::new("name")]]);
    }

    #[test]
    fn legacy_uses_first_element_in_key_order() {
        let config = raw(json!({ "fields": [{
            "z": [{ "fieldname": "city", "suffix": ", " }, { "fieldname": "ignored" }],
            "a": [{ "fieldname": "country" }]
        }, { "empty": [] }] }));
        let rows = normalize_rows(&[], config.fields.as_deref().unwrap());
        assert_eq!(
            rows,
            vec![vec![
                FieldPart::decorated("city", "", ", "),
                FieldPart::new("country")
            ]]
        );
    }

    #[test]
    fn canonical_rows_win_over_legacy() {
        let config = raw(json!({
            "rows": [[{ "fieldname": "a" }]],
            "fields": [{ "k": [{ "fieldname": "b" }] }]
        }));
        let rows = normalize_rows(
            config.rows.as_deref().unwrap(),
            config.fields.as_deref().unwrap(),
        );
        assert_eq!(rows, vec![vec![FieldPart::new("a")]]);
    }

    #[test]
    fn neither_shape_yields_no_rows() {
        assert!(normalize_rows(&[], &[]).is_empty());
    }

    #[test]
    fn collects_template_then_rows_deduplicated() {
        let rows = vec![
            vec![FieldPart::new("b"), FieldPart::new("")],
            vec![FieldPart::new("c"), FieldPart::new("a")],
        ];
        let names = collect_field_names(&rows, Some("{{a}} {{b}} {{a}} {{ not_ident }}")).unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn no_fields_anywhere_fails() {
        let err = collect_field_names(&[], Some("static text")).unwrap_err();
        assert_eq!(err, CompositeError::NoFields);
    }

    #[test]
    fn decoration_first_match_wins() {
        let rows = vec![
            vec![FieldPart::decorated("a", "A:", "")],
            vec![FieldPart::decorated("a", "Other:", "!")],
        ];
        assert_eq!(find_decoration(&rows, "a").unwrap().displayname, "A:");
        assert!(find_decoration(&rows, "b").is_none());
    }
}
