//! Field value extraction from fetched records.

use serde_json::{Number, Value};

use crate::types::Record;

/// Suffix of the sibling property carrying a field's display-formatted value.
pub const FORMATTED_VALUE_SUFFIX: &str = "@OData.Community.Display.V1.FormattedValue";

/// Placeholder emitted when a structured value cannot be serialized.
pub const UNSERIALIZABLE_PLACEHOLDER: &str = "[object]";

/// Read `field` off `record`, preferring its display-formatted counterpart.
///
/// Absent and null values yield an empty string.
pub fn extract_field(record: &Record, field: &str) -> String {
    let formatted_key = format!("{field}{FORMATTED_VALUE_SUFFIX}");
    match record.get(&formatted_key) {
        Some(formatted) if !formatted.is_null() => stringify(formatted),
        _ => record.get(field).map(stringify).unwrap_or_default(),
    }
}

/// Render any JSON value as display text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value)
            .unwrap_or_else(|_| UNSERIALIZABLE_PLACEHOLDER.to_string()),
    }
}

/// Integral floats print without a fractional part (`3.0` → `3`).
fn format_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn prefers_formatted_value() {
        let r = record(json!({
            "statuscode": 1,
            "statuscode@OData.Community.Display.V1.FormattedValue": "Active"
        }));
        assert_eq!(extract_field(&r, "statuscode"), "Active");
    }

    #[test]
    fn null_formatted_value_falls_back_to_raw() {
        let r = record(json!({
            "revenue": 1500,
            "revenue@OData.Community.Display.V1.FormattedValue": null
        }));
        assert_eq!(extract_field(&r, "revenue"), "1500");
    }

    #[test]
    fn absent_and_null_are_empty() {
        let r = record(json!({ "name": null }));
        assert_eq!(extract_field(&r, "name"), "");
        assert_eq!(extract_field(&r, "missing"), "");
    }

    #[test]
    fn scalars_stringify_canonically() {
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(3.0)), "3");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&json!(-0.25)), "-0.25");
    }

    #[test]
    fn arrays_join_recursively() {
        assert_eq!(stringify(&json!(["a", 1, [true, null]])), "a, 1, true, ");
    }

    #[test]
    fn objects_serialize_compactly() {
        assert_eq!(stringify(&json!({ "a": 1, "b": "x" })), r#"{"a":1,"b":"x"}"#);
    }
}
