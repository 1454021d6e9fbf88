//! Literal escaping for emitted SQL.

/// Escape character declared on every emitted LIKE.
pub const LIKE_ESCAPE_CHAR: char = '\\';
pub const LIKE_ESCAPE_CLAUSE: &str = " ESCAPE '\\'";

/// Double single quotes for use inside a SQL string literal.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// `'value'` with quotes escaped.
pub fn quote(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}

/// Escape LIKE metacharacters; the result still needs [`quote`].
pub fn escape_sql_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push(LIKE_ESCAPE_CHAR);
        }
        escaped.push(c);
    }
    escaped
}

/// LIKE pattern for a `*`/`?` wildcard; `None` when there is nothing to expand.
pub fn wildcard_to_like(value: &str) -> Option<String> {
    if !value.contains(['*', '?']) {
        return None;
    }
    let pattern = escape_sql_like(value)
        .chars()
        .map(|c| match c {
            '*' => '%',
            '?' => '_',
            other => other,
        })
        .collect();
    Some(pattern)
}

/// Round-trippable literal for a finite float.
pub fn float_literal(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes() {
        assert_eq!(escape_sql_string("it's"), "it''s");
        assert_eq!(quote("a'b"), "'a''b'");
        assert_eq!(escape_sql_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_wildcard_to_like() {
        assert_eq!(wildcard_to_like("a*b?c").as_deref(), Some("a%b_c"));
        assert_eq!(wildcard_to_like("a_b*").as_deref(), Some("a\\_b%"));
        assert_eq!(wildcard_to_like("plain"), None);
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(5.0), "5.0");
        assert_eq!(float_literal(2.5), "2.5");
        assert_eq!(float_literal(-0.125), "-0.125");
    }
}
