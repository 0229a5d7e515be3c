//! LIMIT/OFFSET injection into arbitrary SELECT text.

use std::sync::LazyLock;

use regex::Regex;

use super::statements::trim_statement_tail;

static LIMIT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\b").expect("limit pattern is valid"));

/// Alias given to the derived table when a statement already has a LIMIT.
pub const DERIVED_TABLE_ALIAS: &str = "paged_result";

/// Rewrites SELECT statements to fetch one bounded page.
pub struct PaginationRewriter;

impl PaginationRewriter {
    /// Rewrite `select` to return at most `limit` rows starting at `offset`.
    ///
    /// Statements without a LIMIT get one appended. Statements that already
    /// have a LIMIT are wrapped as a derived table and the new LIMIT/OFFSET is
    /// applied to the wrapper, leaving the original clause untouched. Trailing
    /// comments are dropped so the new clause cannot land inside one.
    pub fn rewrite(select: &str, limit: u32, offset: u64) -> String {
        let statement = Self::strip_terminator(select);
        if Self::has_limit(statement) {
            format!(
                "SELECT * FROM ( {statement} ) AS {DERIVED_TABLE_ALIAS} LIMIT {limit} OFFSET {offset}"
            )
        } else {
            format!("{statement} LIMIT {limit} OFFSET {offset}")
        }
    }

    /// Whether the statement contains LIMIT as a whole word, in any case.
    pub fn has_limit(statement: &str) -> bool {
        LIMIT_KEYWORD.is_match(statement)
    }

    fn strip_terminator(statement: &str) -> &str {
        trim_statement_tail(statement).trim_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_limit() {
        assert_eq!(
            PaginationRewriter::rewrite("SELECT * FROM t", 50, 0),
            "SELECT * FROM t LIMIT 50 OFFSET 0"
        );
    }

    #[test]
    fn test_wraps_existing_limit() {
        assert_eq!(
            PaginationRewriter::rewrite("SELECT * FROM t LIMIT 10", 50, 100),
            "SELECT * FROM ( SELECT * FROM t LIMIT 10 ) AS paged_result LIMIT 50 OFFSET 100"
        );
    }

    #[test]
    fn test_limit_match_is_case_insensitive_and_whole_word() {
        assert!(PaginationRewriter::has_limit("select * from t limit 5"));
        assert!(PaginationRewriter::has_limit("SELECT * FROM t\nLiMiT 5"));
        assert!(!PaginationRewriter::has_limit("SELECT speed_limit FROM cars"));
        assert!(!PaginationRewriter::has_limit("SELECT * FROM limits"));
    }

    #[test]
    fn test_trailing_semicolon_removed() {
        assert_eq!(
            PaginationRewriter::rewrite("  SELECT 1 ;  ", 10, 20),
            "SELECT 1 LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_trailing_comment_removed_before_limit() {
        assert_eq!(
            PaginationRewriter::rewrite("SELECT * FROM t -- all rows", 50, 0),
            "SELECT * FROM t LIMIT 50 OFFSET 0"
        );
        assert_eq!(
            PaginationRewriter::rewrite("SELECT * FROM t LIMIT 10 # ten", 50, 100),
            "SELECT * FROM ( SELECT * FROM t LIMIT 10 ) AS paged_result LIMIT 50 OFFSET 100"
        );
        assert_eq!(
            PaginationRewriter::rewrite("SELECT '# not a comment' FROM t /* note */;", 5, 0),
            "SELECT '# not a comment' FROM t LIMIT 5 OFFSET 0"
        );
    }
}
