//! The seam between statement routing and the live connection.

use crate::error::PocketError;
use crate::models::RawResultSet;
use crate::sql::BoundStatement;

use async_trait::async_trait;

/// Runs SQL text against one connection.
///
/// [`crate::services::SqlSession`] is the production implementation; tests
/// script their own.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Run a row-producing statement and read every row as text.
    async fn fetch(&mut self, sql: &str) -> Result<RawResultSet, PocketError>;

    /// Run a mutating statement and report the affected-row count.
    async fn execute(&mut self, sql: &str) -> Result<u64, PocketError>;

    /// Run a mutating statement with bound parameters.
    async fn execute_bound(&mut self, statement: &BoundStatement) -> Result<u64, PocketError>;
}
