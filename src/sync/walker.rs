//! Forward-only cursor pagination over a filtered customer listing.
//!
//! A [`PageWalk`] is a lazy, non-restartable sequence of pages. Each page
//! request goes through the shared [`RequestExecutor`], so it acquires
//! throttle permission and is retried according to the retry policy. The
//! walk ends at the upstream end-of-data marker, at the page ceiling, or on
//! cancellation; [`SyncAccumulator`] folds pages into a deduplicated
//! [`SyncResult`].

use crate::errors::{DirectoryError, DirectoryResult};
use crate::resilience::{RequestExecutor, RequestKind};
use crate::services::{CustomerDirectory, ListCustomersRequest};
use crate::types::{CustomerId, CustomerPage, CustomerRecord, PageCursor, SyncResult, WalkTermination};
use chrono::Utc;
use futures::Stream;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Pagination limits
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Records per page
    pub page_size: u32,
    /// Records returned by a preview
    pub preview_size: u32,
    /// Safety ceiling on pages per walk
    pub max_pages: u32,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            preview_size: 10,
            max_pages: 1000,
        }
    }
}

/// Starts page walks against one upstream connection
pub struct CursorWalker {
    directory: Arc<dyn CustomerDirectory>,
    executor: Arc<RequestExecutor>,
    config: WalkConfig,
}

impl CursorWalker {
    /// Create a walker
    pub fn new(
        directory: Arc<dyn CustomerDirectory>,
        executor: Arc<RequestExecutor>,
        config: WalkConfig,
    ) -> Self {
        Self {
            directory,
            executor,
            config,
        }
    }

    /// The configured limits
    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// Walk every page matching `filter`, up to the configured ceiling
    pub fn walk(&self, filter: impl Into<String>, cancel: CancellationToken) -> PageWalk<'_> {
        self.walk_with(filter, self.config.page_size, self.config.max_pages, cancel)
    }

    /// Walk with explicit limits
    pub fn walk_with(
        &self,
        filter: impl Into<String>,
        page_size: u32,
        max_pages: u32,
        cancel: CancellationToken,
    ) -> PageWalk<'_> {
        PageWalk {
            walker: self,
            filter: filter.into(),
            page_size,
            max_pages,
            cursor: None,
            pages_fetched: 0,
            termination: None,
            failed: false,
            cancel,
        }
    }
}

impl std::fmt::Debug for CursorWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorWalker")
            .field("config", &self.config)
            .finish()
    }
}

/// One in-progress walk
pub struct PageWalk<'a> {
    walker: &'a CursorWalker,
    filter: String,
    page_size: u32,
    max_pages: u32,
    cursor: Option<PageCursor>,
    pages_fetched: u32,
    termination: Option<WalkTermination>,
    failed: bool,
    cancel: CancellationToken,
}

impl<'a> PageWalk<'a> {
    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the walk has ended; [`Self::termination`]
    /// then says why. A fatal error also ends the walk, with no termination.
    pub async fn next_page(&mut self) -> DirectoryResult<Option<CustomerPage>> {
        if !self.has_next() {
            return Ok(None);
        }

        if self.pages_fetched >= self.max_pages {
            info!(
                filter = %self.filter,
                pages = self.pages_fetched,
                "Page ceiling reached, stopping walk"
            );
            self.termination = Some(WalkTermination::PageCeiling);
            return Ok(None);
        }

        if self.cancel.is_cancelled() {
            self.termination = Some(WalkTermination::Cancelled);
            return Ok(None);
        }

        let mut request = ListCustomersRequest::first_page(Some(self.filter.clone()), self.page_size);
        if let Some(cursor) = self.cursor.clone() {
            request = request.after(cursor);
        }

        let directory = &self.walker.directory;
        let result = self
            .walker
            .executor
            .execute("customers.list", RequestKind::Page, &self.cancel, || {
                directory.list_page(request.clone())
            })
            .await;

        let page = match result {
            Ok(page) => page,
            Err(DirectoryError::Cancelled) => {
                self.termination = Some(WalkTermination::Cancelled);
                return Ok(None);
            }
            Err(error) => {
                self.failed = true;
                return Err(error);
            }
        };

        self.pages_fetched += 1;
        match &page.next_cursor {
            Some(token) => {
                self.cursor = Some(PageCursor {
                    token: token.clone(),
                    index: self.pages_fetched,
                });
            }
            None => self.termination = Some(WalkTermination::EndOfData),
        }

        debug!(
            page = page.index,
            records = page.len(),
            last = page.is_last(),
            "Walked page"
        );

        Ok(Some(page))
    }

    /// Why the walk ended, once it has
    pub fn termination(&self) -> Option<WalkTermination> {
        self.termination
    }

    /// Pages fetched so far
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Whether more pages may follow
    pub fn has_next(&self) -> bool {
        self.termination.is_none() && !self.failed
    }

    /// Consume the walk as a stream of pages
    pub fn into_stream(self) -> impl Stream<Item = DirectoryResult<CustomerPage>> + 'a {
        futures::stream::unfold(Some(self), |walk| async move {
            let mut walk = walk?;
            match walk.next_page().await {
                Ok(Some(page)) => Some((Ok(page), Some(walk))),
                Ok(None) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }
}

/// Folds walked pages into a deduplicated result
#[derive(Debug)]
pub struct SyncAccumulator {
    segment: String,
    seen: HashSet<CustomerId>,
    records: Vec<CustomerRecord>,
    expected_count: Option<u64>,
    pages: u32,
    duplicates: usize,
}

impl SyncAccumulator {
    /// Start accumulating for `segment`
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            seen: HashSet::new(),
            records: Vec::new(),
            expected_count: None,
            pages: 0,
            duplicates: 0,
        }
    }

    /// Fold one page in; returns how many new records it contributed
    pub fn push_page(&mut self, page: CustomerPage) -> usize {
        self.pages += 1;
        if self.expected_count.is_none() {
            self.expected_count = page.expected_count;
        }

        let before = self.records.len();
        for record in page.records {
            if self.seen.insert(record.id.clone()) {
                self.records.push(record);
            } else {
                self.duplicates += 1;
            }
        }
        self.records.len() - before
    }

    /// Distinct records so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been accumulated
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pages folded so far
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Advisory total from the first page that reported one
    pub fn expected_count(&self) -> Option<u64> {
        self.expected_count
    }

    /// Records dropped as duplicates
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Finish into a result
    pub fn finish(self, termination: WalkTermination) -> SyncResult {
        SyncResult {
            segment: self.segment,
            expected_count: self.expected_count,
            actual_count: self.records.len(),
            records: self.records,
            pages: self.pages,
            completed_at: Utc::now(),
            partial: termination == WalkTermination::PageCeiling,
            termination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagSet;
    use pretty_assertions::assert_eq;

    fn page(index: u32, ids: &[&str], next: Option<&str>) -> CustomerPage {
        CustomerPage {
            index,
            records: ids
                .iter()
                .map(|id| CustomerRecord::new(*id, TagSet::new()))
                .collect(),
            next_cursor: next.map(str::to_string),
            expected_count: Some(5),
        }
    }

    #[test]
    fn test_accumulator_dedups_and_keeps_order() {
        let mut acc = SyncAccumulator::new("VIP");
        assert_eq!(acc.push_page(page(0, &["a", "b", "c"], Some("1"))), 3);
        assert_eq!(acc.push_page(page(1, &["c", "d", "a", "e"], None)), 2);

        assert_eq!(acc.duplicates(), 2);
        let result = acc.finish(WalkTermination::EndOfData);
        let ids: Vec<_> = result.identifiers().into_iter().map(|id| id.0).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(result.actual_count, 5);
        assert_eq!(result.pages, 2);
        assert!(!result.partial);
    }

    #[test]
    fn test_ceiling_marks_partial_but_cancel_does_not() {
        let acc = SyncAccumulator::new("VIP");
        assert!(acc.finish(WalkTermination::PageCeiling).partial);

        let acc = SyncAccumulator::new("VIP");
        let result = acc.finish(WalkTermination::Cancelled);
        assert!(!result.partial);
        assert!(result.is_incomplete());
    }
}
