//! Database and table introspection.

use crate::error::PocketError;
use crate::models::{ColumnSpec, RawResultSet};
use crate::services::executor::StatementExecutor;
use crate::sql::SqlCommandBuilder;

use regex::Regex;
use std::sync::LazyLock;

/// `varchar(255)`, `decimal(10,2) unsigned`, `text`
static COLUMN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]+)\s*(?:\(([^)]*)\))?").expect("column type pattern is valid")
});

/// Service for schema introspection.
pub struct SchemaService;

impl SchemaService {
    /// Every database visible to the login, in server order.
    pub async fn list_databases<E>(executor: &mut E) -> Result<Vec<String>, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let result = executor.fetch(SqlCommandBuilder::show_databases()).await?;
        Ok(first_column(result))
    }

    /// Tables of `database`, sorted case-insensitively.
    pub async fn list_tables<E>(executor: &mut E, database: &str) -> Result<Vec<String>, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let result = executor.fetch(&SqlCommandBuilder::show_tables(database)).await?;
        let mut tables = first_column(result);
        tables.sort_by_key(|t| t.to_lowercase());
        tracing::debug!(database = %database, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// Column structure of a table, in definition order.
    pub async fn describe_table<E>(
        executor: &mut E,
        database: &str,
        table: &str,
    ) -> Result<Vec<ColumnSpec>, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let result = executor.fetch(&SqlCommandBuilder::describe_table(database, table)).await?;
        parse_describe(&result)
    }

    /// The server's CREATE TABLE text for a table.
    pub async fn show_create_table<E>(
        executor: &mut E,
        database: &str,
        table: &str,
    ) -> Result<String, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let result = executor.fetch(&SqlCommandBuilder::show_create_table(database, table)).await?;
        // Columns are (Table, Create Table)
        result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().nth(1).flatten())
            .ok_or_else(|| PocketError::database(format!("No definition returned for `{table}`"), None))
    }

    /// Collation names the server supports, sorted.
    pub async fn list_collations<E>(executor: &mut E) -> Result<Vec<String>, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let result = executor.fetch(SqlCommandBuilder::show_collations()).await?;
        let mut collations = first_column(result);
        collations.sort();
        Ok(collations)
    }
}

fn first_column(result: RawResultSet) -> Vec<String> {
    result.rows.into_iter().filter_map(|row| row.into_iter().next().flatten()).collect()
}

/// Split a DESCRIBE type such as `varchar(255)` into `("VARCHAR", Some("255"))`.
fn parse_column_type(raw: &str) -> (String, Option<String>) {
    match COLUMN_TYPE.captures(raw) {
        Some(caps) => {
            let base = caps.get(1).map_or("", |m| m.as_str()).to_uppercase();
            let length = caps.get(2).map(|m| m.as_str().trim().to_string()).filter(|l| !l.is_empty());
            (base, length)
        }
        None => (raw.trim().to_uppercase(), None),
    }
}

fn parse_describe(result: &RawResultSet) -> Result<Vec<ColumnSpec>, PocketError> {
    let index_of = |name: &str| {
        result.columns.iter().position(|c| c.eq_ignore_ascii_case(name)).ok_or_else(|| {
            PocketError::database(format!("DESCRIBE output is missing the {name} column"), None)
        })
    };
    let field = index_of("Field")?;
    let type_ = index_of("Type")?;
    let null = index_of("Null")?;
    let key = index_of("Key")?;
    let default = index_of("Default")?;
    let extra = index_of("Extra")?;

    let cell = |row: &[Option<String>], i: usize| row.get(i).cloned().flatten();

    Ok(result
        .rows
        .iter()
        .map(|row| {
            let row = row.as_slice();
            let (base_type, length) = parse_column_type(&cell(row, type_).unwrap_or_default());
            ColumnSpec {
                name: cell(row, field).unwrap_or_default(),
                base_type,
                length,
                nullable: cell(row, null).is_some_and(|n| n.eq_ignore_ascii_case("YES")),
                primary_key: cell(row, key).is_some_and(|k| k == "PRI"),
                auto_increment: cell(row, extra)
                    .is_some_and(|e| e.to_lowercase().contains("auto_increment")),
                default: cell(row, default),
            }
        })
        .collect())
}
