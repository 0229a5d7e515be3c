//! Turning raw rows into immutable snapshots.

use crate::models::{QueryTarget, RawResultSet, TabularSnapshot, NULL_SENTINEL};
use crate::services::executor::StatementExecutor;
use crate::sql::SqlCommandBuilder;

/// Column of DESCRIBE output holding the column name.
const DESCRIBE_FIELD: &str = "Field";
/// Column of DESCRIBE output holding the key marker.
const DESCRIBE_KEY: &str = "Key";
/// Key marker of a primary key column.
const PRIMARY_KEY_MARKER: &str = "PRI";

/// Builds [`TabularSnapshot`]s from executor output.
pub struct ResultMaterializer;

impl ResultMaterializer {
    /// Materialize `raw` and enrich it with the target table's primary key.
    ///
    /// Key discovery is best-effort: when it fails, or the key column is not
    /// part of the result, the snapshot simply has no primary key.
    pub async fn materialize<E>(executor: &mut E, raw: RawResultSet, target: QueryTarget) -> TabularSnapshot
    where
        E: StatementExecutor + ?Sized,
    {
        let primary_key = match Self::discover_primary_key(executor, &target).await {
            Some(key) if raw.columns.iter().any(|c| *c == key) => Some(key),
            Some(key) => {
                tracing::debug!(primary_key = %key, "Primary key not among result columns");
                None
            }
            None => None,
        };
        Self::shape(raw, target, primary_key)
    }

    /// Build a snapshot without touching the server. NULL cells become
    /// [`NULL_SENTINEL`].
    pub fn shape(raw: RawResultSet, target: QueryTarget, primary_key: Option<String>) -> TabularSnapshot {
        let width = raw.columns.len();
        let rows = raw
            .rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row
                    .into_iter()
                    .map(|cell| cell.unwrap_or_else(|| NULL_SENTINEL.to_string()))
                    .collect();
                // Rows are as wide as the header
                cells.resize(width.max(cells.len()), NULL_SENTINEL.to_string());
                cells
            })
            .collect();

        TabularSnapshot::new(raw.columns, rows, target, primary_key)
    }

    /// Name of the first primary key column of the target table.
    pub async fn discover_primary_key<E>(executor: &mut E, target: &QueryTarget) -> Option<String>
    where
        E: StatementExecutor + ?Sized,
    {
        let table = target.table.as_deref()?;
        let sql = match target.database.as_deref() {
            Some(database) => SqlCommandBuilder::describe_table(database, table),
            None => format!("DESCRIBE {}", SqlCommandBuilder::quote_identifier(table)),
        };

        let described = match executor.fetch(&sql).await {
            Ok(described) => described,
            Err(e) => {
                tracing::debug!(table = %table, error = %e, "Primary key discovery failed");
                return None;
            }
        };

        let field = described.columns.iter().position(|c| c == DESCRIBE_FIELD)?;
        let key = described.columns.iter().position(|c| c == DESCRIBE_KEY)?;
        described.rows.iter().find_map(|row| {
            let is_primary = row.get(key)?.as_deref()? == PRIMARY_KEY_MARKER;
            if is_primary {
                row.get(field)?.clone()
            } else {
                None
            }
        })
    }
}
