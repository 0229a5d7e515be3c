//! Column structure model.

use serde::{Deserialize, Serialize};

/// Type names that accept a collation.
pub const TEXT_TYPE_FAMILY: &[&str] =
    &["CHAR", "VARCHAR", "TINYTEXT", "TEXT", "MEDIUMTEXT", "LONGTEXT", "ENUM", "SET"];

/// Describes one column, either read from the server or requested by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Base type name (e.g. "VARCHAR", "INT")
    pub base_type: String,
    /// Length or precision inside the parentheses (e.g. "255", "10,2")
    pub length: Option<String>,
    /// Whether NULL is allowed
    pub nullable: bool,
    /// Part of the primary key
    pub primary_key: bool,
    /// AUTO_INCREMENT column
    pub auto_increment: bool,
    /// Default value, rendered as a quoted literal
    pub default: Option<String>,
}

impl ColumnSpec {
    /// Create a nullable column with no extras.
    pub fn new(name: impl Into<String>, base_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_type: base_type.into(),
            length: None,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            default: None,
        }
    }

    /// Set the length.
    pub fn with_length(mut self, length: impl Into<String>) -> Self {
        self.length = Some(length.into());
        self
    }

    /// Mark as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark as part of the primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as AUTO_INCREMENT.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether the base type belongs to the character/text family.
    pub fn is_text_type(&self) -> bool {
        let upper = self.base_type.trim().to_uppercase();
        TEXT_TYPE_FAMILY.contains(&upper.as_str())
    }

    /// Full type as the server prints it, e.g. `VARCHAR(255)`.
    pub fn type_display(&self) -> String {
        match &self.length {
            Some(len) if !len.trim().is_empty() => {
                format!("{}({})", self.base_type.trim().to_uppercase(), len.trim())
            }
            _ => self.base_type.trim().to_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_family_lookup() {
        assert!(ColumnSpec::new("a", "varchar").is_text_type());
        assert!(ColumnSpec::new("a", "LONGTEXT").is_text_type());
        assert!(!ColumnSpec::new("a", "int").is_text_type());
        assert!(!ColumnSpec::new("a", "BLOB").is_text_type());
    }

    #[test]
    fn test_type_display() {
        assert_eq!(ColumnSpec::new("p", "decimal").with_length("10,2").type_display(), "DECIMAL(10,2)");
        assert_eq!(ColumnSpec::new("d", "date").type_display(), "DATE");
        assert_eq!(ColumnSpec::new("d", "int").with_length(" ").type_display(), "INT");
    }

    #[test]
    fn test_primary_key_implies_not_null() {
        let col = ColumnSpec::new("id", "INT").primary_key();
        assert!(col.primary_key);
        assert!(!col.nullable);
    }
}
