//! Query-literal encoding for the `<field> eq <literal>` filter grammar.

use regex::Regex;
use std::sync::LazyLock;

/// Canonical 8-4-4-4-12 GUID.
static GUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

/// Integer or decimal numeral, ASCII digits only.
static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());

/// Remove one leading `{` and one trailing `}` from an identifier (`{GUID}` → `GUID`).
pub fn strip_braces(raw: &str) -> &str {
    let raw = raw.strip_prefix('{').unwrap_or(raw);
    raw.strip_suffix('}').unwrap_or(raw)
}

/// Encode an identifier as a filter literal.
///
/// GUIDs and numerals are emitted bare; anything else is single-quoted with embedded
/// quotes doubled.
pub fn encode_literal(raw: &str) -> String {
    let value = strip_braces(raw);
    if GUID_RE.is_match(value) || NUMERIC_RE.is_match(value) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

    #[test]
    fn braced_guid_matches_bare_guid() {
        let braced = format!("{{{GUID}}}");
        assert_eq!(encode_literal(&braced), encode_literal(GUID));
        assert_eq!(encode_literal(&braced), GUID);
    }

    #[test]
    fn uppercase_guid_is_unquoted() {
        let upper = GUID.to_uppercase();
        assert_eq!(encode_literal(&upper), upper);
    }

    #[test]
    fn numerals_are_unquoted() {
        assert_eq!(encode_literal("42"), "42");
        assert_eq!(encode_literal("3.14"), "3.14");
        assert_eq!(encode_literal("-7"), "-7");
    }

    #[test]
    fn strings_are_quoted_and_escaped() {
        assert_eq!(encode_literal("O'Brien"), "'O''Brien'");
        assert_eq!(encode_literal("ACME"), "'ACME'");
    }

    #[test]
    fn near_guid_is_quoted() {
        assert_eq!(
            encode_literal("3f2504e0-4f89-11d3-9a0c"),
            "'3f2504e0-4f89-11d3-9a0c'"
        );
    }

    #[test]
    fn malformed_numerals_are_quoted() {
        assert_eq!(encode_literal("1."), "'1.'");
        assert_eq!(encode_literal("1e5"), "'1e5'");
    }

    #[test]
    fn non_ascii_digits_are_quoted() {
        assert_eq!(encode_literal("\u{0661}\u{0662}"), "'\u{0661}\u{0662}'");
        assert_eq!(encode_literal("\u{FF11}"), "'\u{FF11}'");
    }

    #[test]
    fn only_one_brace_stripped_per_side() {
        assert_eq!(strip_braces("{{abc}}"), "{abc}");
        assert_eq!(strip_braces("{abc"), "abc");
        assert_eq!(strip_braces("abc}"), "abc");
        assert_eq!(encode_literal("{{42}}"), "'{42}'");
    }
}
