//! Pagination and segment sync types.

use super::CustomerRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Continuation point inside a single walk. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Opaque upstream token
    pub token: String,
    /// Index of the page this cursor resumes at (0-based)
    pub index: u32,
}

/// One page returned by the upstream list endpoint
#[derive(Debug, Clone, Default)]
pub struct CustomerPage {
    /// Page index within the walk (0-based)
    pub index: u32,
    /// Records in upstream order
    pub records: Vec<CustomerRecord>,
    /// Cursor for the next page; `None` is the end-of-data marker
    pub next_cursor: Option<String>,
    /// Advisory total for the whole filter, if the upstream reported one
    pub expected_count: Option<u64>,
}

impl CustomerPage {
    /// Whether this page ends the listing
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Number of records in the page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How a segment walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkTermination {
    /// Upstream signalled end of data
    EndOfData,
    /// The page ceiling was reached first
    PageCeiling,
    /// The caller cancelled
    Cancelled,
    /// A fatal upstream error ended the walk
    Aborted,
}

/// Complete or partial list of customers in a segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Segment name
    pub segment: String,
    /// Advisory count from upstream metadata
    pub expected_count: Option<u64>,
    /// Records actually retrieved
    pub actual_count: usize,
    /// Deduplicated records in upstream page order
    pub records: Vec<CustomerRecord>,
    /// Pages fetched
    pub pages: u32,
    /// When the walk finished
    pub completed_at: DateTime<Utc>,
    /// True when the page ceiling was hit
    pub partial: bool,
    /// How the walk ended
    pub termination: WalkTermination,
}

impl SyncResult {
    /// Empty result for a segment with no filter mapping
    pub fn empty(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            expected_count: Some(0),
            actual_count: 0,
            records: Vec::new(),
            pages: 0,
            completed_at: Utc::now(),
            partial: false,
            termination: WalkTermination::EndOfData,
        }
    }

    /// Whether the walk stopped before end of data, for any reason
    pub fn is_incomplete(&self) -> bool {
        self.termination != WalkTermination::EndOfData
    }

    /// Identifiers in record order
    pub fn identifiers(&self) -> Vec<super::CustomerId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }
}

/// Live progress of a segment sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Segment name
    pub segment: String,
    /// Pages completed so far
    pub pages_completed: u32,
    /// Distinct records so far
    pub records_so_far: usize,
    /// Advisory total, when known
    pub expected_count: Option<u64>,
}

/// Per-segment sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SyncState {
    /// No sync running
    Idle,
    /// Fetching the given page index
    Fetching {
        /// Page being fetched (0 is the first page)
        page: u32,
    },
    /// Reached end of data
    Complete,
    /// Stopped at the page ceiling or by cancellation
    PartialComplete,
    /// Fatal upstream error or resolver failure
    Failed,
}
