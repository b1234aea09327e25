//! Mock implementations for testing.
//!
//! [`MockHttpTransport`] replays canned HTTP replies through the same
//! classification as the real transport. [`MockDirectory`] is a scripted
//! in-memory upstream for the sync and mutation layers.

use crate::errors::{DirectoryError, DirectoryResult, NetworkError, ResponseError};
use crate::services::{CustomerDirectory, ListCustomersRequest};
use crate::transport::{classify_response, GraphQlRequest, GraphQlResponse, HttpTransport};
use crate::types::{CustomerId, CustomerPage, CustomerRecord, TagSet};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock response configuration
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Retry-After header value
    pub retry_after: Option<Duration>,
    /// Fail with a timeout instead of replying
    pub timeout: bool,
    /// Delay before responding
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// Successful JSON response
    pub fn json(body: Value) -> Self {
        Self::status(200, body.to_string())
    }

    /// Response with an arbitrary status and body
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
            timeout: false,
            delay: None,
        }
    }

    /// HTTP 429 with a Retry-After header
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            retry_after: Some(Duration::from_secs(retry_after_secs)),
            ..Self::status(429, "")
        }
    }

    /// HTTP 200 carrying a THROTTLED GraphQL error
    pub fn throttled(requested: f64, available: f64, restore_rate: f64) -> Self {
        Self::json(json!({
            "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}],
            "extensions": {"cost": {
                "requestedQueryCost": requested,
                "throttleStatus": {
                    "maximumAvailable": 1000.0,
                    "currentlyAvailable": available,
                    "restoreRate": restore_rate
                }
            }}
        }))
    }

    /// Request timeout
    pub fn timeout() -> Self {
        Self {
            timeout: true,
            ..Self::status(0, "")
        }
    }

    /// Add delay to response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Mock HTTP transport for testing
#[derive(Default)]
pub struct MockHttpTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<GraphQlRequest>>,
    default_response: Option<MockResponse>,
}

impl MockHttpTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// Queue a response (builder form)
    pub fn with_response(self, response: MockResponse) -> Self {
        self.push(response);
        self
    }

    /// Set default response when queue is empty
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.requests.lock().clone()
    }

    /// Get remaining response count
    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn post_graphql(&self, request: GraphQlRequest) -> DirectoryResult<GraphQlResponse> {
        self.requests.lock().push(request);

        let response = self
            .responses
            .lock()
            .pop_front()
            .or_else(|| self.default_response.clone())
            .ok_or_else(|| {
                DirectoryError::Response(ResponseError::Deserialization {
                    message: "No mock response configured".to_string(),
                })
            })?;

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        if response.timeout {
            return Err(NetworkError::Timeout.into());
        }

        classify_response(response.status, response.retry_after, &response.body)
    }
}

type ErrorFactory = Arc<dyn Fn() -> DirectoryError + Send + Sync>;

enum SegmentPages {
    Scripted(Vec<Vec<CustomerId>>),
    Endless { page_size: usize },
}

struct PageFailure {
    index: u32,
    remaining: usize,
    make: ErrorFactory,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<CustomerId, CustomerRecord>,
    segments: HashMap<String, SegmentPages>,
    page_failures: Vec<PageFailure>,
    read_failures: HashMap<CustomerId, ErrorFactory>,
    write_failures: HashMap<CustomerId, ErrorFactory>,
    writes: Vec<(CustomerId, TagSet)>,
    list_calls: usize,
    read_calls: usize,
}

/// Scripted in-memory customer directory
#[derive(Default)]
pub struct MockDirectory {
    state: Mutex<MockState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, so concurrent callers overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a customer
    pub fn with_customer(self, record: CustomerRecord) -> Self {
        self.state.lock().customers.insert(record.id.clone(), record);
        self
    }

    /// Script the pages returned for `filter`; unknown ids become customers
    /// with no tags
    pub fn with_segment(self, filter: &str, pages: &[&[&str]]) -> Self {
        {
            let mut state = self.state.lock();
            let pages: Vec<Vec<CustomerId>> = pages
                .iter()
                .map(|page| page.iter().map(|id| CustomerId::new(*id)).collect())
                .collect();
            for id in pages.iter().flatten() {
                state
                    .customers
                    .entry(id.clone())
                    .or_insert_with(|| CustomerRecord::new(id.clone(), TagSet::new()));
            }
            state
                .segments
                .insert(filter.to_string(), SegmentPages::Scripted(pages));
        }
        self
    }

    /// A listing for `filter` that never signals end of data
    pub fn with_endless_segment(self, filter: &str, page_size: usize) -> Self {
        self.state
            .lock()
            .segments
            .insert(filter.to_string(), SegmentPages::Endless { page_size });
        self
    }

    /// Fail the request for page `index` the next `times` times
    pub fn fail_page<F>(self, index: u32, times: usize, make: F) -> Self
    where
        F: Fn() -> DirectoryError + Send + Sync + 'static,
    {
        self.state.lock().page_failures.push(PageFailure {
            index,
            remaining: times,
            make: Arc::new(make),
        });
        self
    }

    /// Always fail reads of `id`
    pub fn fail_read<F>(self, id: &str, make: F) -> Self
    where
        F: Fn() -> DirectoryError + Send + Sync + 'static,
    {
        self.state
            .lock()
            .read_failures
            .insert(CustomerId::new(id), Arc::new(make));
        self
    }

    /// Always fail writes to `id`
    pub fn fail_write<F>(self, id: &str, make: F) -> Self
    where
        F: Fn() -> DirectoryError + Send + Sync + 'static,
    {
        self.state
            .lock()
            .write_failures
            .insert(CustomerId::new(id), Arc::new(make));
        self
    }

    /// Current tags of a customer
    pub fn tags_of(&self, id: &str) -> Option<TagSet> {
        self.state
            .lock()
            .customers
            .get(&CustomerId::new(id))
            .map(|c| c.tags.clone())
    }

    /// Writes received, in arrival order
    pub fn writes(&self) -> Vec<(CustomerId, TagSet)> {
        self.state.lock().writes.clone()
    }

    /// Number of list calls, including failed attempts
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Number of read calls, including failed attempts
    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CustomerDirectory for MockDirectory {
    async fn list_page(&self, request: ListCustomersRequest) -> DirectoryResult<CustomerPage> {
        let _guard = self.enter().await;
        let index = request.page_index();
        let mut state = self.state.lock();
        state.list_calls += 1;

        if let Some(failure) = state
            .page_failures
            .iter_mut()
            .find(|f| f.index == index && f.remaining > 0)
        {
            failure.remaining -= 1;
            return Err((failure.make)());
        }

        let filter = request.filter.clone().unwrap_or_default();
        let (ids, last, expected) = match state.segments.get(&filter) {
            None => (Vec::new(), true, Some(0)),
            Some(SegmentPages::Scripted(pages)) => {
                let ids = pages.get(index as usize).cloned().unwrap_or_default();
                let mut distinct: Vec<&CustomerId> = pages.iter().flatten().collect();
                distinct.sort();
                distinct.dedup();
                (ids, index as usize + 1 >= pages.len(), Some(distinct.len() as u64))
            }
            Some(SegmentPages::Endless { page_size }) => {
                let ids = (0..*page_size)
                    .map(|n| CustomerId::new(format!("{filter}-{index}-{n}")))
                    .collect();
                (ids, false, None)
            }
        };

        let records = ids
            .into_iter()
            .map(|id| {
                state
                    .customers
                    .entry(id.clone())
                    .or_insert_with(|| CustomerRecord::new(id, TagSet::new()))
                    .clone()
            })
            .collect();

        Ok(CustomerPage {
            index,
            records,
            next_cursor: (!last).then(|| format!("cursor-{}", index + 1)),
            expected_count: expected,
        })
    }

    async fn get_customer(&self, id: &CustomerId) -> DirectoryResult<CustomerRecord> {
        let _guard = self.enter().await;
        let mut state = self.state.lock();
        state.read_calls += 1;

        if let Some(make) = state.read_failures.get(id) {
            return Err(make());
        }
        state
            .customers
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::customer_not_found(id.as_str()))
    }

    async fn update_tags(&self, id: &CustomerId, tags: &TagSet) -> DirectoryResult<()> {
        let _guard = self.enter().await;
        let mut state = self.state.lock();

        if let Some(make) = state.write_failures.get(id) {
            return Err(make());
        }
        let record = state
            .customers
            .get_mut(id)
            .ok_or_else(|| DirectoryError::customer_not_found(id.as_str()))?;
        record.tags = tags.clone();
        state.writes.push((id.clone(), tags.clone()));
        Ok(())
    }
}
