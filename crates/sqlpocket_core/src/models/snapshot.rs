//! Tabular result models.

use serde::{Deserialize, Serialize};

/// Text every engine NULL is rendered as. Never equal to an empty cell.
pub const NULL_SENTINEL: &str = "NULL";

/// Rows exactly as the executor read them, before materialization.
///
/// A `None` cell is an engine NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultSet {
    /// Column names in cursor order
    pub columns: Vec<String>,
    /// Rows in cursor order
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawResultSet {
    /// Create a result set.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }
}

/// Where a query's rows come from, used for primary key discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTarget {
    /// Database the rows belong to
    pub database: Option<String>,
    /// Table the rows belong to
    pub table: Option<String>,
}

impl QueryTarget {
    /// Target a specific table.
    pub fn table(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self { database: Some(database.into()), table: Some(table.into()) }
    }

    /// Target only a database (custom SQL run inside it).
    pub fn database(database: impl Into<String>) -> Self {
        Self { database: Some(database.into()), table: None }
    }
}

/// An immutable page (or accumulated pages) of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularSnapshot {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    table: Option<String>,
    database: Option<String>,
    primary_key: Option<String>,
}

impl TabularSnapshot {
    /// Create a snapshot.
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        target: QueryTarget,
        primary_key: Option<String>,
    ) -> Self {
        Self { columns, rows, table: target.table, database: target.database, primary_key }
    }

    /// Ordered column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Ordered rows; NULL cells hold [`NULL_SENTINEL`].
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Source table, when known.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Source database, when known.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Discovered primary key column.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the snapshot has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell text at row/column, if in range.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }

    /// Whether a cell holds an engine NULL.
    pub fn is_null(&self, row: usize, column: usize) -> bool {
        self.cell(row, column) == Some(NULL_SENTINEL)
    }

    /// Primary key value of a row, when the key column is known.
    pub fn primary_key_value(&self, row: usize) -> Option<&str> {
        let column = self.primary_key().and_then(|pk| self.column_index(pk))?;
        self.cell(row, column)
    }

    /// New snapshot with `page`'s rows appended after this one's.
    pub fn append(&self, page: &TabularSnapshot) -> TabularSnapshot {
        let mut rows = Vec::with_capacity(self.rows.len() + page.rows.len());
        rows.extend(self.rows.iter().cloned());
        rows.extend(page.rows.iter().cloned());
        TabularSnapshot {
            columns: if self.columns.is_empty() { page.columns.clone() } else { self.columns.clone() },
            rows,
            table: self.table.clone(),
            database: self.database.clone(),
            primary_key: self.primary_key.clone().or_else(|| page.primary_key.clone()),
        }
    }
}

/// What one executed statement produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum QueryOutcome {
    /// A row-producing statement
    Rows(TabularSnapshot),
    /// A mutating statement
    Affected(u64),
}

impl QueryOutcome {
    /// Snapshot, if this outcome produced rows.
    pub fn snapshot(&self) -> Option<&TabularSnapshot> {
        match self {
            Self::Rows(snapshot) => Some(snapshot),
            Self::Affected(_) => None,
        }
    }

    /// Affected row count, if this outcome came from a mutating statement.
    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Affected(count) => Some(*count),
        }
    }
}
