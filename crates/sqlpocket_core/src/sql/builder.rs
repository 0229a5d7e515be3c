//! SQL text builders for DDL, DML and introspection.
//!
//! Every builder is pure. Identifiers are always backtick-quoted; row values
//! are returned as bind parameters and never concatenated into the SQL.

use crate::error::PocketError;
use crate::models::ColumnSpec;

use std::sync::LazyLock;

use regex::Regex;

/// Identifier quote character for MySQL.
pub const IDENTIFIER_QUOTE: char = '`';

/// Defaults rendered bare instead of as a quoted literal.
const DEFAULT_KEYWORDS: &[&str] = &["NULL", "CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"];

static COLLATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+(_[A-Za-z0-9]+)*$").expect("collation pattern is valid")
});

static TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9 ]*$").expect("type pattern is valid")
});

static LENGTH_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(\s*,\s*\d+)?|'[^']*'(\s*,\s*'[^']*')*)$").expect("length pattern is valid")
});

/// Ordered column/value pairs for INSERT and UPDATE. `None` binds SQL NULL.
pub type FieldMap = Vec<(String, Option<String>)>;

/// SQL text plus the values to bind to its `?` placeholders, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    /// Statement text with `?` placeholders
    pub sql: String,
    /// Values bound to the placeholders
    pub params: Vec<Option<String>>,
}

/// Builds SQL statements for structured intents.
pub struct SqlCommandBuilder;

impl SqlCommandBuilder {
    // ========== Quoting ==========

    /// Wrap an identifier in backticks, doubling embedded backticks.
    pub fn quote_identifier(name: &str) -> String {
        let escaped = name.replace(IDENTIFIER_QUOTE, "``");
        format!("{IDENTIFIER_QUOTE}{escaped}{IDENTIFIER_QUOTE}")
    }

    /// `` `database`.`table` ``
    pub fn qualified_table(database: &str, table: &str) -> String {
        format!("{}.{}", Self::quote_identifier(database), Self::quote_identifier(table))
    }

    /// Single-quoted string literal with quotes and backslashes escaped.
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    /// Character set implied by a collation name (`utf8mb4_general_ci` -> `utf8mb4`).
    pub fn charset_for_collation(collation: &str) -> &str {
        collation.split('_').next().unwrap_or(collation)
    }

    // ========== Column definitions ==========

    /// Render `name type[(length)] [NULL|NOT NULL] [AUTO_INCREMENT] [DEFAULT 'v'] [COLLATE x]`.
    ///
    /// The collation is only applied to character/text types.
    pub fn column_definition(
        column: &ColumnSpec,
        collation: Option<&str>,
    ) -> Result<String, PocketError> {
        Self::validate_column(column)?;

        let mut parts = vec![Self::quote_identifier(&column.name), column.type_display()];

        parts.push(if column.nullable && !column.primary_key { "NULL" } else { "NOT NULL" }.into());

        if column.auto_increment {
            parts.push("AUTO_INCREMENT".into());
        }

        if let Some(default) = &column.default {
            parts.push(Self::default_clause(column, default)?);
        }

        if let Some(collation) = collation {
            if column.is_text_type() {
                Self::validate_collation(collation)?;
                parts.push(format!("COLLATE {collation}"));
            }
        }

        Ok(parts.join(" "))
    }

    /// `DEFAULT` clause. Keywords are emitted bare unless the value is
    /// single-quoted, which forces a string literal (`'NULL'`).
    fn default_clause(column: &ColumnSpec, default: &str) -> Result<String, PocketError> {
        let trimmed = default.trim();
        if let Some(inner) = trimmed.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return Ok(format!("DEFAULT {}", Self::quote_literal(&inner.replace("''", "'"))));
        }

        let upper = trimmed.to_uppercase();
        if upper == "NULL" && (!column.nullable || column.primary_key) {
            return Err(PocketError::validation(format!(
                "Column {} is NOT NULL and cannot default to NULL",
                column.name
            )));
        }
        if DEFAULT_KEYWORDS.contains(&upper.as_str()) {
            Ok(format!("DEFAULT {upper}"))
        } else {
            Ok(format!("DEFAULT {}", Self::quote_literal(default)))
        }
    }

    // ========== DDL ==========

    /// CREATE TABLE with a PRIMARY KEY clause over every primary-key column.
    ///
    /// Zero key columns is legal and emits no PRIMARY KEY clause.
    pub fn create_table(
        database: &str,
        table: &str,
        columns: &[ColumnSpec],
        collation: Option<&str>,
    ) -> Result<String, PocketError> {
        Self::validate_name("Table", table)?;
        if columns.is_empty() {
            return Err(PocketError::validation("A table needs at least one column"));
        }

        let mut lines = columns
            .iter()
            .map(|c| Self::column_definition(c, collation))
            .collect::<Result<Vec<_>, _>>()?;

        let keys: Vec<String> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| Self::quote_identifier(&c.name))
            .collect();
        if !keys.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            Self::qualified_table(database, table),
            lines.join(",\n  ")
        );
        if let Some(collation) = collation {
            Self::validate_collation(collation)?;
            sql.push_str(&format!(
                " DEFAULT CHARSET={} COLLATE={}",
                Self::charset_for_collation(collation),
                collation
            ));
        }
        Ok(sql)
    }

    /// DROP TABLE.
    pub fn drop_table(database: &str, table: &str) -> String {
        format!("DROP TABLE {}", Self::qualified_table(database, table))
    }

    /// TRUNCATE TABLE.
    pub fn truncate_table(database: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {}", Self::qualified_table(database, table))
    }

    /// ALTER TABLE ... ADD COLUMN.
    pub fn add_column(
        database: &str,
        table: &str,
        column: &ColumnSpec,
        collation: Option<&str>,
    ) -> Result<String, PocketError> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            Self::qualified_table(database, table),
            Self::column_definition(column, collation)?
        ))
    }

    /// ALTER TABLE ... MODIFY COLUMN.
    pub fn modify_column(
        database: &str,
        table: &str,
        column: &ColumnSpec,
        collation: Option<&str>,
    ) -> Result<String, PocketError> {
        Ok(format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            Self::qualified_table(database, table),
            Self::column_definition(column, collation)?
        ))
    }

    /// ALTER TABLE ... DROP COLUMN.
    pub fn drop_column(database: &str, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            Self::qualified_table(database, table),
            Self::quote_identifier(column)
        )
    }

    /// CREATE DATABASE with an optional charset/collation.
    pub fn create_database(name: &str, collation: Option<&str>) -> Result<String, PocketError> {
        Self::validate_name("Database", name)?;
        let mut sql = format!("CREATE DATABASE {}", Self::quote_identifier(name));
        if let Some(collation) = collation {
            Self::validate_collation(collation)?;
            sql.push_str(&format!(
                " CHARACTER SET {} COLLATE {}",
                Self::charset_for_collation(collation),
                collation
            ));
        }
        Ok(sql)
    }

    /// DROP DATABASE.
    pub fn drop_database(name: &str) -> String {
        format!("DROP DATABASE {}", Self::quote_identifier(name))
    }

    // ========== Introspection ==========

    /// USE database.
    pub fn use_database(name: &str) -> String {
        format!("USE {}", Self::quote_identifier(name))
    }

    /// SHOW DATABASES.
    pub fn show_databases() -> &'static str {
        "SHOW DATABASES"
    }

    /// SHOW TABLES in a database.
    pub fn show_tables(database: &str) -> String {
        format!("SHOW TABLES FROM {}", Self::quote_identifier(database))
    }

    /// DESCRIBE a table.
    pub fn describe_table(database: &str, table: &str) -> String {
        format!("DESCRIBE {}", Self::qualified_table(database, table))
    }

    /// SHOW CREATE TABLE.
    pub fn show_create_table(database: &str, table: &str) -> String {
        format!("SHOW CREATE TABLE {}", Self::qualified_table(database, table))
    }

    /// SHOW COLLATION.
    pub fn show_collations() -> &'static str {
        "SHOW COLLATION"
    }

    /// Browse every row of a table.
    pub fn select_all(database: &str, table: &str) -> String {
        format!("SELECT * FROM {}", Self::qualified_table(database, table))
    }

    // ========== DML ==========

    /// Parameterized INSERT.
    pub fn insert(database: &str, table: &str, fields: &FieldMap) -> Result<BoundStatement, PocketError> {
        if fields.is_empty() {
            return Err(PocketError::validation("Nothing to insert"));
        }
        let columns: Vec<String> = fields.iter().map(|(c, _)| Self::quote_identifier(c)).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        Ok(BoundStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                Self::qualified_table(database, table),
                columns.join(", "),
                placeholders
            ),
            params: fields.iter().map(|(_, v)| v.clone()).collect(),
        })
    }

    /// Parameterized UPDATE of the row whose key column equals `key_value`.
    pub fn update(
        database: &str,
        table: &str,
        key_column: &str,
        key_value: &str,
        fields: &FieldMap,
    ) -> Result<BoundStatement, PocketError> {
        if fields.is_empty() {
            return Err(PocketError::validation("Nothing to update"));
        }
        let assignments: Vec<String> =
            fields.iter().map(|(c, _)| format!("{} = ?", Self::quote_identifier(c))).collect();
        let mut params: Vec<Option<String>> = fields.iter().map(|(_, v)| v.clone()).collect();
        params.push(Some(key_value.to_string()));
        Ok(BoundStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ?",
                Self::qualified_table(database, table),
                assignments.join(", "),
                Self::quote_identifier(key_column)
            ),
            params,
        })
    }

    /// Parameterized DELETE of the row whose key column equals `key_value`.
    pub fn delete(database: &str, table: &str, key_column: &str, key_value: &str) -> BoundStatement {
        BoundStatement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ?",
                Self::qualified_table(database, table),
                Self::quote_identifier(key_column)
            ),
            params: vec![Some(key_value.to_string())],
        }
    }

    // ========== Validation ==========

    fn validate_name(what: &str, name: &str) -> Result<(), PocketError> {
        if name.trim().is_empty() {
            return Err(PocketError::validation(format!("{what} name is required")));
        }
        Ok(())
    }

    fn validate_column(column: &ColumnSpec) -> Result<(), PocketError> {
        Self::validate_name("Column", &column.name)?;
        if !TYPE_NAME.is_match(column.base_type.trim()) {
            return Err(PocketError::validation(format!(
                "Invalid type for column {}: {}",
                column.name, column.base_type
            )));
        }
        if let Some(length) = &column.length {
            let length = length.trim();
            if !length.is_empty() && !LENGTH_SPEC.is_match(length) {
                return Err(PocketError::validation(format!(
                    "Invalid length for column {}: {}",
                    column.name, length
                )));
            }
        }
        Ok(())
    }

    fn validate_collation(collation: &str) -> Result<(), PocketError> {
        if COLLATION_NAME.is_match(collation) {
            Ok(())
        } else {
            Err(PocketError::validation(format!("Invalid collation: {collation}")))
        }
    }
}
