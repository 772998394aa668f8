/// Enforce `max_len` characters on `text`, ending with `indicator` when cut.
///
/// A missing or non-positive limit disables truncation. When the indicator alone does
/// not fit, the indicator itself is cut to the limit.
pub fn truncate(text: &str, max_len: Option<i64>, indicator: &str) -> String {
    let max = match max_len {
        Some(max) if max > 0 => usize::try_from(max).unwrap_or(usize::MAX),
        _ => return text.to_string(),
    };

    if text.chars().count() <= max {
        return text.to_string();
    }

    let indicator_len = indicator.chars().count();
    if indicator_len >= max {
        return indicator.chars().take(max).collect();
    }

    let mut out: String = text.chars().take(max - indicator_len).collect();
    out.push_str(indicator);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuts_and_appends_indicator() {
        assert_eq!(truncate("abcdefgh", Some(5), "..."), "ab...");
    }

    #[test]
    fn within_limit_is_unchanged() {
        assert_eq!(truncate("ab", Some(5), "..."), "ab");
        assert_eq!(truncate("abcde", Some(5), "..."), "abcde");
    }

    #[test]
    fn indicator_longer_than_limit_is_cut() {
        assert_eq!(truncate("abcdef", Some(2), "..."), "..");
        assert_eq!(truncate("abcdef", Some(3), "..."), "...");
    }

    #[test]
    fn no_positive_limit_is_noop() {
        assert_eq!(truncate("abcdef", None, "..."), "abcdef");
        assert_eq!(truncate("abcdef", Some(0), "..."), "abcdef");
        assert_eq!(truncate("abcdef", Some(-4), "..."), "abcdef");
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(truncate("Ærøskøbing", Some(6), "…"), "Ærøsk…");
    }

    #[test]
    fn empty_indicator() {
        assert_eq!(truncate("abcdef", Some(4), ""), "abcd");
    }
}
