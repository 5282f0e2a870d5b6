/// Escape character passed to `ILIKE ... ESCAPE`.
pub const LIKE_ESCAPE: char = '\\';

/// Escape LIKE metacharacters so user input matches literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Build a `%term%` substring pattern from raw user input.
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(escape_like("ivan.ivanov@mail.ru"), "ivan.ivanov@mail.ru");
    }

    #[test]
    fn wildcards_are_escaped() {
        assert_eq!(escape_like("100%"), r"100\%");
        assert_eq!(escape_like("a_b"), r"a\_b");
        assert_eq!(escape_like(r"c:\tmp"), r"c:\\tmp");
    }

    #[test]
    fn pattern_wraps_escaped_term() {
        assert_eq!(contains_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(contains_pattern(""), "%%");
    }
}
