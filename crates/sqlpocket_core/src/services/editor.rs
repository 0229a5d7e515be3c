//! Row-level edits on a browsed table.

use crate::error::PocketError;
use crate::models::TabularSnapshot;
use crate::services::executor::StatementExecutor;
use crate::sql::{FieldMap, SqlCommandBuilder};

/// Identifies one row by its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    /// Primary key column
    pub column: String,
    /// Key value of the row
    pub value: String,
}

impl RowKey {
    /// Create a row key.
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { column: column.into(), value: value.into() }
    }

    /// Key of row `row` in a browsed snapshot.
    ///
    /// Fails with [`PocketError::MissingPrimaryKey`] when the snapshot has no
    /// known key, since the row cannot be addressed unambiguously.
    pub fn from_snapshot(snapshot: &TabularSnapshot, row: usize) -> Result<Self, PocketError> {
        let table = snapshot.table().unwrap_or_default().to_string();
        let column = snapshot.primary_key().ok_or_else(|| PocketError::MissingPrimaryKey { table })?;
        let value = snapshot
            .primary_key_value(row)
            .ok_or_else(|| PocketError::validation(format!("Row {row} is out of range")))?;
        Ok(Self::new(column, value))
    }
}

/// Inserts, updates and deletes single rows with bound parameters.
pub struct TableEditor;

impl TableEditor {
    /// Insert one row.
    pub async fn insert_row<E>(
        executor: &mut E,
        database: &str,
        table: &str,
        fields: &FieldMap,
    ) -> Result<u64, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let statement = SqlCommandBuilder::insert(database, table, fields)?;
        let affected = executor.execute_bound(&statement).await?;
        tracing::debug!(database = %database, table = %table, affected, "Row inserted");
        Ok(affected)
    }

    /// Update the row identified by `key`.
    pub async fn update_row<E>(
        executor: &mut E,
        database: &str,
        table: &str,
        key: &RowKey,
        fields: &FieldMap,
    ) -> Result<u64, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let statement = SqlCommandBuilder::update(database, table, &key.column, &key.value, fields)?;
        let affected = executor.execute_bound(&statement).await?;
        tracing::debug!(database = %database, table = %table, affected, "Row updated");
        Ok(affected)
    }

    /// Delete the row identified by `key`.
    pub async fn delete_row<E>(
        executor: &mut E,
        database: &str,
        table: &str,
        key: &RowKey,
    ) -> Result<u64, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let statement = SqlCommandBuilder::delete(database, table, &key.column, &key.value);
        let affected = executor.execute_bound(&statement).await?;
        tracing::debug!(database = %database, table = %table, affected, "Row deleted");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryTarget;

    #[test]
    fn test_row_key_requires_primary_key() {
        let snap = TabularSnapshot::new(
            vec!["a".into()],
            vec![vec!["1".into()]],
            QueryTarget::table("shop", "log"),
            None,
        );
        let err = RowKey::from_snapshot(&snap, 0).unwrap_err();
        assert!(matches!(err, PocketError::MissingPrimaryKey { ref table } if table == "log"));
    }

    #[test]
    fn test_row_key_from_snapshot() {
        let snap = TabularSnapshot::new(
            vec!["name".into(), "id".into()],
            vec![vec!["ann".into(), "7".into()]],
            QueryTarget::table("shop", "users"),
            Some("id".into()),
        );
        assert_eq!(RowKey::from_snapshot(&snap, 0).unwrap(), RowKey::new("id", "7"));
        assert!(RowKey::from_snapshot(&snap, 3).is_err());
    }
}
