//! Routing SQL text to the right execution path.

use crate::error::PocketError;
use crate::models::{PageRequest, QueryOutcome, QueryTarget};
use crate::services::executor::StatementExecutor;
use crate::services::materializer::ResultMaterializer;
use crate::sql::{classify_statement, is_pageable, split_statements, BoundStatement, PaginationRewriter, StatementKind};

use std::time::Instant;

/// Splits user SQL into statements and runs them in order.
pub struct QueryRouter;

impl QueryRouter {
    /// Execute every statement in `raw` and return the last one's outcome.
    ///
    /// Execution stops at the first failing statement; statements before it
    /// have already been applied. Outcomes of earlier statements are
    /// discarded.
    ///
    /// # Arguments
    /// * `executor` - Connection to run statements on
    /// * `raw` - User SQL, possibly several `;`-separated statements
    /// * `target` - Table/database the rows belong to, for key discovery
    pub async fn execute<E>(executor: &mut E, raw: &str, target: &QueryTarget) -> Result<QueryOutcome, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        Self::run(executor, split_statements(raw), target).await
    }

    /// Like [`Self::execute`], but the last statement is rewritten to fetch
    /// one page when it is a SELECT.
    pub async fn execute_page<E>(
        executor: &mut E,
        raw: &str,
        target: &QueryTarget,
        page: PageRequest,
    ) -> Result<QueryOutcome, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let mut statements = split_statements(raw);
        if let Some(last) = statements.last_mut() {
            if is_pageable(last) {
                *last = PaginationRewriter::rewrite(last, page.limit, page.offset);
            }
        }
        Self::run(executor, statements, target).await
    }

    /// Run one parameterized mutating statement.
    pub async fn execute_bound<E>(executor: &mut E, statement: &BoundStatement) -> Result<QueryOutcome, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let affected = executor.execute_bound(statement).await?;
        Ok(QueryOutcome::Affected(affected))
    }

    async fn run<E>(executor: &mut E, statements: Vec<String>, target: &QueryTarget) -> Result<QueryOutcome, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        if statements.is_empty() {
            return Err(PocketError::NoValidStatement);
        }

        let start = Instant::now();
        let last_index = statements.len() - 1;
        let mut outcome = None;

        for (index, statement) in statements.iter().enumerate() {
            let kind = classify_statement(statement);
            tracing::debug!(index, kind = ?kind, "Executing statement");

            let result = match kind {
                StatementKind::RowProducing if index == last_index => {
                    match executor.fetch(statement).await {
                        Ok(raw) => {
                            let snapshot = ResultMaterializer::materialize(executor, raw, target.clone()).await;
                            Ok(QueryOutcome::Rows(snapshot))
                        }
                        Err(e) => Err(e),
                    }
                }
                // Earlier result sets are read and dropped
                StatementKind::RowProducing => executor
                    .fetch(statement)
                    .await
                    .map(|raw| QueryOutcome::Rows(ResultMaterializer::shape(raw, target.clone(), None))),
                StatementKind::Mutating => executor.execute(statement).await.map(QueryOutcome::Affected),
            };

            match result {
                Ok(result) => outcome = Some(result),
                Err(e) => {
                    tracing::warn!(index, total = statements.len(), error = %e, "Statement failed; aborting batch");
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            statements = statements.len(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Batch completed"
        );
        outcome.ok_or(PocketError::NoValidStatement)
    }
}
