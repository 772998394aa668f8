//! Composite string construction from fetched records.

use regex::Captures;

use crate::extract::extract_field;
use crate::rows::{find_decoration, PLACEHOLDER_RE};
use crate::types::{Record, Row};

/// Render one record, by template when one is given, else by row concatenation.
pub fn build_composite(
    record: &Record,
    rows: &[Row],
    template: Option<&str>,
    separator: &str,
) -> String {
    match template {
        Some(template) => render_template(record, rows, template),
        None => render_rows(record, rows, separator),
    }
}

/// Render every record and join the non-blank renderings with `separator`.
pub fn build_composite_many(
    records: &[Record],
    rows: &[Row],
    template: Option<&str>,
    separator: &str,
) -> String {
    records
        .iter()
        .map(|record| build_composite(record, rows, template, separator))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn render_rows(record: &Record, rows: &[Row], separator: &str) -> String {
    rows.iter()
        .map(|row| render_row(record, row))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn render_row(record: &Record, row: &Row) -> String {
    let mut line = String::new();
    for part in row {
        let value = extract_field(record, &part.fieldname);
        if value.is_empty() {
            continue;
        }
        line.push_str(&part.displayname);
        line.push_str(&value);
        line.push_str(&part.suffix);
    }
    line
}

fn render_template(record: &Record, rows: &[Row], template: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let field = &caps[1];
            let value = extract_field(record, field);
            if value.is_empty() {
                return String::new();
            }
            match find_decoration(rows, field) {
                Some(part) => format!("{}{}{}", part.displayname, value, part.suffix),
                None => value,
            }
        })
        .into_owned()
}
