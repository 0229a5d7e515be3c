//! Splitting SQL text into statements and classifying them.

/// Leading keywords of statements that return rows.
pub const ROW_PRODUCING_KEYWORDS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC"];

/// Separator between statements in a batch.
pub const STATEMENT_SEPARATOR: char = ';';

/// How a statement reports its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns a result set
    RowProducing,
    /// Returns an affected-row count
    Mutating,
}

/// Split `text` on `;`, trim every fragment and drop empty ones.
///
/// Separators inside quoted strings, backtick identifiers and comments do not
/// split.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q != '`' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                // doubled quote stays inside the literal
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                skip_line_comment(&mut chars, &mut current, c);
            }
            '#' => {
                skip_line_comment(&mut chars, &mut current, c);
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    current.push(inner);
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            STATEMENT_SEPARATOR => {
                push_fragment(&mut fragments, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_fragment(&mut fragments, &current);
    fragments
}

fn skip_line_comment(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    current: &mut String,
    first: char,
) {
    current.push(first);
    for inner in chars.by_ref() {
        current.push(inner);
        if inner == '\n' {
            break;
        }
    }
}

fn push_fragment(fragments: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
}

/// Drop trailing comments, separators and whitespace from a statement.
///
/// Comment markers inside quoted strings and backtick identifiers are text,
/// not comments.
pub fn trim_statement_tail(statement: &str) -> &str {
    let mut end = 0;
    let mut chars = statement.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            let mut last = (i, c);
            if c == '\\' && q != '`' {
                if let Some(escaped) = chars.next() {
                    last = escaped;
                }
            } else if c == q {
                match chars.peek() {
                    Some(&(j, next)) if next == q => {
                        chars.next();
                        last = (j, next);
                    }
                    _ => quote = None,
                }
            }
            end = last.0 + last.1.len_utf8();
            continue;
        }

        match c {
            '-' if chars.peek().map(|&(_, n)| n) == Some('-') => {
                for (_, inner) in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '#' => {
                for (_, inner) in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek().map(|&(_, n)| n) == Some('*') => {
                chars.next();
                let mut prev = '\0';
                for (_, inner) in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            STATEMENT_SEPARATOR => {}
            c if c.is_whitespace() => {}
            _ => {
                if matches!(c, '\'' | '"' | '`') {
                    quote = Some(c);
                }
                end = i + c.len_utf8();
            }
        }
    }
    &statement[..end]
}

/// Classify a single statement by its leading keyword, case-insensitively.
///
/// Leading comments are skipped.
pub fn classify_statement(statement: &str) -> StatementKind {
    let first_word: String = strip_leading_comments(statement)
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    if ROW_PRODUCING_KEYWORDS.contains(&first_word.as_str()) {
        StatementKind::RowProducing
    } else {
        StatementKind::Mutating
    }
}

/// Whether a statement can take an injected LIMIT/OFFSET.
///
/// Only SELECT qualifies; SHOW and DESCRIBE produce rows but cannot be paged.
pub fn is_pageable(statement: &str) -> bool {
    let first_word: String = strip_leading_comments(statement)
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    first_word.eq_ignore_ascii_case("SELECT")
}

fn strip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    loop {
        if rest.starts_with("--") || rest.starts_with('#') {
            rest = rest.find('\n').map_or("", |i| &rest[i + 1..]).trim_start();
        } else if let Some(body) = rest.strip_prefix("/*") {
            rest = body.find("*/").map_or("", |i| &body[i + 2..]).trim_start();
        } else {
            return rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_trims_and_drops_empty() {
        assert_eq!(split_statements("SELECT 1; UPDATE t SET x=1"), vec!["SELECT 1", "UPDATE t SET x=1"]);
        assert!(split_statements("   ;  ").is_empty());
        assert!(split_statements("").is_empty());
        assert_eq!(split_statements(";;SELECT 1;;"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_split_ignores_separators_in_literals() {
        let parts = split_statements("INSERT INTO t VALUES ('a;b'); SELECT `x;y` FROM t");
        assert_eq!(parts, vec!["INSERT INTO t VALUES ('a;b')", "SELECT `x;y` FROM t"]);

        let parts = split_statements(r"SELECT 'it\'s;' ; SELECT 'o''k;'");
        assert_eq!(parts, vec![r"SELECT 'it\'s;'", "SELECT 'o''k;'"]);
    }

    #[test]
    fn test_split_ignores_separators_in_comments() {
        let parts = split_statements("SELECT 1 -- one; two\n; /* a;b */ SELECT 2");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("SELECT 1"));
        assert!(parts[1].ends_with("SELECT 2"));
    }

    #[test]
    fn test_use_prefix() {
        assert_eq!(split_statements("USE `shop`;\nSELECT * FROM orders"), vec!["USE `shop`", "SELECT * FROM orders"]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_statement("select 1"), StatementKind::RowProducing);
        assert_eq!(classify_statement("  SHOW TABLES"), StatementKind::RowProducing);
        assert_eq!(classify_statement("describe t"), StatementKind::RowProducing);
        assert_eq!(classify_statement("DESC t"), StatementKind::RowProducing);
        assert_eq!(classify_statement("UPDATE t SET x=1"), StatementKind::Mutating);
        assert_eq!(classify_statement("USE shop"), StatementKind::Mutating);
        assert_eq!(classify_statement("SELECTED"), StatementKind::Mutating);
        assert_eq!(classify_statement("/* hint */ SELECT 2"), StatementKind::RowProducing);
        assert_eq!(classify_statement("-- note\nshow databases"), StatementKind::RowProducing);
    }

    #[test]
    fn test_trim_statement_tail() {
        assert_eq!(trim_statement_tail("SELECT * FROM t -- all rows"), "SELECT * FROM t");
        assert_eq!(trim_statement_tail("SELECT 1 # one\n"), "SELECT 1");
        assert_eq!(trim_statement_tail("SELECT 1 /* a */ ; -- b"), "SELECT 1");
        assert_eq!(trim_statement_tail("SELECT 1 -- x\n;  "), "SELECT 1");
        assert_eq!(trim_statement_tail("SELECT '-- kept #' FROM t"), "SELECT '-- kept #' FROM t");
        assert_eq!(trim_statement_tail("SELECT `a#b`, 'it''s' -- c"), "SELECT `a#b`, 'it''s'");
        assert_eq!(trim_statement_tail("SELECT a -- mid\nFROM t"), "SELECT a -- mid\nFROM t");
        assert_eq!(trim_statement_tail("-- only a comment"), "");
    }

    #[test]
    fn test_is_pageable() {
        assert!(is_pageable("select * from t"));
        assert!(is_pageable("/* x */ SELECT 1"));
        assert!(!is_pageable("SHOW TABLES"));
        assert!(!is_pageable("DELETE FROM t"));
    }
}
