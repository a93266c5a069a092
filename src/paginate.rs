//! Shared page-walking for the three paginated reads: Keeping page numbers,
//! Notion cursors and BigQuery page tokens.
//!
//! A source describes one request as `fetch(token) -> Page`; a page with
//! `next: None` is the last one.

use crate::error::SyncError;

/// Upper bound on requests for a single listing.
pub const DEFAULT_PAGE_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn more(items: Vec<T>, next: C) -> Self {
        Self {
            items,
            next: Some(next),
        }
    }
}

/// Lazy iterator over the pages of one listing. Yields each page's items and
/// stops after the last page or the first error.
pub struct Pages<T, C, F>
where
    F: FnMut(&C) -> Result<Page<T, C>, SyncError>,
{
    fetch: F,
    next: Option<C>,
    requests: usize,
    limit: usize,
    source_name: &'static str,
}

impl<T, C, F> Pages<T, C, F>
where
    F: FnMut(&C) -> Result<Page<T, C>, SyncError>,
{
    pub fn new(source_name: &'static str, first: C, fetch: F) -> Self {
        Self {
            fetch,
            next: Some(first),
            requests: 0,
            limit: DEFAULT_PAGE_LIMIT,
            source_name,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn requests(&self) -> usize {
        self.requests
    }
}

impl<T, C, F> Iterator for Pages<T, C, F>
where
    F: FnMut(&C) -> Result<Page<T, C>, SyncError>,
{
    type Item = Result<Vec<T>, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next.take()?;
        if self.requests >= self.limit {
            return Some(Err(SyncError::PageLimit {
                source_name: self.source_name,
                limit: self.limit,
            }));
        }
        self.requests += 1;
        tracing::debug!(source = self.source_name, request = self.requests, "fetching page");
        match (self.fetch)(&token) {
            Ok(page) => {
                self.next = page.next;
                Some(Ok(page.items))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Drains every page into one vector, in arrival order.
pub fn collect_all<T, C, F>(
    source_name: &'static str,
    first: C,
    fetch: F,
) -> Result<Vec<T>, SyncError>
where
    F: FnMut(&C) -> Result<Page<T, C>, SyncError>,
{
    let mut items = Vec::new();
    for page in Pages::new(source_name, first, fetch) {
        items.extend(page?);
    }
    Ok(items)
}
