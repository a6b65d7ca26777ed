//! Pagination types shared by every list/search surface.
//!
//! Requests are 1-based and clamped rather than rejected: a client asking
//! for page 0 or a 10 000-row page gets the nearest sane request instead of
//! a 400, which keeps cursorless UIs simple.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 25;
const MAX_PAGE_SIZE: i64 = 200;

/// A page request: 1-based page number plus page size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Page number clamped to ≥ 1.
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Page size clamped to 1..=200.
    pub fn size(&self) -> i64 {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    /// SQL OFFSET for this request.
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.size()
    }
}

/// Body of a `POST /search` request: paging plus domain-specific filters,
/// flattened into one JSON object.
#[derive(Debug, Deserialize)]
pub struct SearchRequest<F> {
    #[serde(flatten)]
    pub page: PageRequest,
    #[serde(flatten)]
    pub filters: F,
}

/// One page of results plus the totals a client needs to render a pager.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> PageResult<T> {
    /// Assemble a page from a fetched slice and the unfiltered total.
    pub fn new(items: Vec<T>, request: &PageRequest, total: i64) -> Self {
        let size = request.size();
        Self {
            items,
            page: request.page(),
            size,
            total,
            total_pages: (total + size - 1) / size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_clamped() {
        let req = PageRequest { page: 0, size: 0 };
        assert_eq!(req.page(), 1);
        assert_eq!(req.size(), 1);
        assert_eq!(req.offset(), 0);

        let req = PageRequest {
            page: 3,
            size: 100_000,
        };
        assert_eq!(req.size(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 2 * MAX_PAGE_SIZE);
    }

    #[test]
    fn total_pages_rounds_up() {
        let req = PageRequest { page: 1, size: 10 };
        let page = PageResult::new(vec![1, 2, 3], &req, 21);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total, 21);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let req = PageRequest::default();
        let page: PageResult<i32> = PageResult::new(vec![], &req, 0);
        assert_eq!(page.total_pages, 0);
    }
}
