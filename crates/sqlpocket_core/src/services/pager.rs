//! Incremental loading of a SELECT's rows.

use crate::error::PocketError;
use crate::models::{PageRequest, PageState, QueryTarget, TabularSnapshot};
use crate::services::executor::StatementExecutor;
use crate::services::materializer::ResultMaterializer;
use crate::sql::{is_pageable, split_statements, PaginationRewriter};

use uuid::Uuid;

/// Accumulates pages of one query into a growing snapshot.
///
/// Only one fetch may be in flight: [`ResultPager::begin`] hands out a
/// request and refuses further ones until [`ResultPager::finish`] runs.
#[derive(Debug, Clone)]
pub struct ResultPager {
    id: Uuid,
    statement: String,
    target: QueryTarget,
    state: PageState,
    snapshot: Option<TabularSnapshot>,
}

impl ResultPager {
    /// Pager for the last statement of `raw`, if it is a SELECT.
    pub fn for_query(raw: &str, target: QueryTarget, page_size: u32) -> Option<Self> {
        let statement = split_statements(raw).pop().filter(|s| is_pageable(s))?;
        Some(Self { id: Uuid::new_v4(), statement, target, state: PageState::new(page_size), snapshot: None })
    }

    /// Identity of this pager; a new query gets a new one.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The SELECT being paged.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Source of the rows.
    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Offset/has-more bookkeeping.
    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// Rows loaded so far.
    pub fn snapshot(&self) -> Option<&TabularSnapshot> {
        self.snapshot.as_ref()
    }

    /// Claim the next page. `None` while a fetch is in flight or when
    /// everything has been loaded.
    pub fn begin(&mut self) -> Option<PageRequest> {
        self.state.begin()
    }

    /// SQL for a claimed page.
    pub fn page_sql(&self, request: PageRequest) -> String {
        PaginationRewriter::rewrite(&self.statement, request.limit, request.offset)
    }

    /// Record the result of a claimed fetch and return the accumulated rows.
    pub fn finish(&mut self, page: Result<TabularSnapshot, PocketError>) -> Result<TabularSnapshot, PocketError> {
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                self.state.fail();
                return Err(e);
            }
        };

        self.state.complete(page.row_count());
        let merged = match &self.snapshot {
            Some(loaded) => loaded.append(&page),
            None => page,
        };
        tracing::debug!(
            pager_id = %self.id,
            offset = self.state.offset(),
            has_more = self.state.has_more(),
            "Page loaded"
        );
        self.snapshot = Some(merged.clone());
        Ok(merged)
    }

    /// Give back a claimed page that will never be finished. The offset is
    /// kept, so the same page is requested next time.
    pub fn abandon(&mut self) {
        if self.state.is_loading() {
            tracing::debug!(pager_id = %self.id, offset = self.state.offset(), "Page fetch abandoned");
            self.state.fail();
        }
    }

    /// Run one page query. Key discovery is skipped; the first page already
    /// carries the key.
    pub async fn fetch_page<E>(executor: &mut E, sql: &str, target: &QueryTarget) -> Result<TabularSnapshot, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let raw = executor.fetch(sql).await?;
        Ok(ResultMaterializer::shape(raw, target.clone(), None))
    }

    /// Claim, fetch and record the next page in one call.
    ///
    /// Returns `Ok(None)` when no page was claimed.
    pub async fn load_more<E>(&mut self, executor: &mut E) -> Result<Option<TabularSnapshot>, PocketError>
    where
        E: StatementExecutor + ?Sized,
    {
        let Some(request) = self.begin() else {
            return Ok(None);
        };
        let claim = PageClaim { pager: self, settled: false };
        let sql = claim.pager.page_sql(request);
        let page = Self::fetch_page(executor, &sql, &claim.pager.target).await;
        claim.settle(page).map(Some)
    }
}

/// A claimed page; released on drop if the fetch never completes.
struct PageClaim<'a> {
    pager: &'a mut ResultPager,
    settled: bool,
}

impl PageClaim<'_> {
    fn settle(mut self, page: Result<TabularSnapshot, PocketError>) -> Result<TabularSnapshot, PocketError> {
        self.settled = true;
        self.pager.finish(page)
    }
}

impl Drop for PageClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.pager.abandon();
        }
    }
}
