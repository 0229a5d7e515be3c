//! Pagination session state.

/// Limit and offset for the next page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Rows to fetch
    pub limit: u32,
    /// Rows to skip
    pub offset: u64,
}

/// Offset/hasMore bookkeeping for one paginated query.
///
/// `has_more` is inferred as "the last page was full", so a final page of
/// exactly `page_size` rows costs one extra, empty fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    page_size: u32,
    offset: u64,
    has_more: bool,
    loading: bool,
}

impl PageState {
    /// Fresh state for a new query.
    pub fn new(page_size: u32) -> Self {
        Self { page_size: page_size.max(1), offset: 0, has_more: true, loading: false }
    }

    /// Rows per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Rows already fetched.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether another page may exist.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Start over for a newly submitted query.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.has_more = true;
        self.loading = false;
    }

    /// Claim the next fetch.
    ///
    /// Returns `None` when a fetch is already in flight or no more rows exist.
    pub fn begin(&mut self) -> Option<PageRequest> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(PageRequest { limit: self.page_size, offset: self.offset })
    }

    /// Record a successful fetch of `rows_returned` rows.
    pub fn complete(&mut self, rows_returned: usize) {
        self.offset += rows_returned as u64;
        self.has_more = rows_returned >= self.page_size as usize;
        self.loading = false;
    }

    /// Release the in-flight claim after a failed fetch; offset is unchanged.
    pub fn fail(&mut self) {
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_advances_by_rows_returned() {
        let mut state = PageState::new(50);
        let req = state.begin().unwrap();
        assert_eq!(req, PageRequest { limit: 50, offset: 0 });
        state.complete(50);
        assert_eq!(state.offset(), 50);
        assert!(state.has_more());

        let req = state.begin().unwrap();
        assert_eq!(req.offset, 50);
        state.complete(12);
        assert_eq!(state.offset(), 62);
        assert!(!state.has_more());
        assert!(state.begin().is_none());
    }

    #[test]
    fn test_single_flight() {
        let mut state = PageState::new(10);
        assert!(state.begin().is_some());
        assert!(state.begin().is_none());
        state.fail();
        assert!(state.begin().is_some());
    }

    #[test]
    fn test_full_last_page_triggers_extra_empty_fetch() {
        let mut state = PageState::new(10);
        state.begin();
        state.complete(10);
        assert!(state.has_more());
        state.begin();
        state.complete(0);
        assert!(!state.has_more());
        assert_eq!(state.offset(), 10);
    }

    #[test]
    fn test_reset() {
        let mut state = PageState::new(10);
        state.begin();
        state.complete(3);
        state.reset();
        assert_eq!(state.offset(), 0);
        assert!(state.has_more());
        assert!(!state.is_loading());
    }
}
