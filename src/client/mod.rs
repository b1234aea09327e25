//! Directory client implementation.
//!
//! Wires one upstream connection: a single throttler and metrics sink shared
//! by the walker and the bulk mutator, plus the store-backed orchestrator and
//! rule executor on top.

use crate::bulk::BulkMutator;
use crate::config::DirectoryConfig;
use crate::errors::DirectoryResult;
use crate::observability::{MetricsCollector, MetricsSnapshot};
use crate::resilience::{RequestExecutor, RetryPolicy, Throttler};
use crate::rules::RuleExecutor;
use crate::services::{CustomerDirectory, CustomersService};
use crate::store::{MemoryStore, SyncStore};
use crate::sync::{CursorWalker, SegmentResolver, SegmentSummary, SyncObserver, SyncOrchestrator};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{
    BulkTagOutcome, CustomerId, CustomerRecord, RuleExecutionResult, SyncResult, SyncState,
    TagAction, TaggingRule,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main directory client
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    metrics: Arc<MetricsCollector>,
    throttler: Arc<Throttler>,
    orchestrator: Arc<SyncOrchestrator>,
    mutator: Arc<BulkMutator>,
    rules: RuleExecutor,
    store: Arc<dyn SyncStore>,
    shutdown: CancellationToken,
}

impl DirectoryClient {
    /// Create a client talking HTTP to the configured upstream, with an
    /// in-memory store
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Self::with_transport(config, transport, Arc::new(MemoryStore::new()))
    }

    /// Create a client over a custom transport and store
    pub fn with_transport(
        config: DirectoryConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SyncStore>,
    ) -> DirectoryResult<Self> {
        config.validate()?;
        let throttler = Arc::new(Throttler::new(config.throttle.clone()));
        let service = CustomersService::new(transport, &config)?.with_throttler(throttler.clone());
        Ok(Self::assemble(config, Arc::new(service), store, throttler))
    }

    /// Create a client over any directory implementation (mocks, fakes)
    pub fn with_directory(
        config: DirectoryConfig,
        directory: Arc<dyn CustomerDirectory>,
        store: Arc<dyn SyncStore>,
    ) -> DirectoryResult<Self> {
        config.validate_limits()?;
        let throttler = Arc::new(Throttler::new(config.throttle.clone()));
        Ok(Self::assemble(config, directory, store, throttler))
    }

    fn assemble(
        config: DirectoryConfig,
        directory: Arc<dyn CustomerDirectory>,
        store: Arc<dyn SyncStore>,
        throttler: Arc<Throttler>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let executor = Arc::new(RequestExecutor::new(
            throttler.clone(),
            RetryPolicy::new(config.retry.clone()),
            metrics.clone(),
        ));

        let walker = CursorWalker::new(directory.clone(), executor.clone(), config.walk.clone());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            walker,
            SegmentResolver::new(config.segments.clone()),
            store.clone(),
            config.cache_ttl,
        ));
        let mutator = Arc::new(BulkMutator::new(directory, executor, config.bulk.clone()));
        let rules = RuleExecutor::new(orchestrator.clone(), mutator.clone(), store.clone());

        info!(
            segments = config.segments.len(),
            page_size = config.walk.page_size,
            concurrency = mutator.concurrency(),
            "Directory client initialized"
        );

        Self {
            config: Arc::new(config),
            metrics,
            throttler,
            orchestrator,
            mutator,
            rules,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Shared throttler
    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    /// Segment orchestrator, for calls with their own cancellation token
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Bulk mutator, for calls with their own cancellation token
    pub fn mutator(&self) -> &BulkMutator {
        &self.mutator
    }

    /// Rule executor, for calls with their own cancellation token
    pub fn rules(&self) -> &RuleExecutor {
        &self.rules
    }

    /// Persistence collaborator
    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Known segments
    pub fn list_segments(&self) -> Vec<SegmentSummary> {
        self.orchestrator.list_segments()
    }

    /// Sync a segment, reporting progress to `observer`
    pub async fn sync_segment(
        &self,
        name: &str,
        force_refresh: bool,
        observer: Option<&dyn SyncObserver>,
    ) -> DirectoryResult<SyncResult> {
        self.orchestrator
            .sync(name, force_refresh, observer, &self.shutdown.child_token())
            .await
    }

    /// Current sync state of a segment
    pub fn segment_state(&self, name: &str) -> SyncState {
        self.orchestrator.state(name)
    }

    /// Up to one page of a segment
    pub async fn preview_segment(&self, name: &str) -> DirectoryResult<Vec<CustomerRecord>> {
        self.orchestrator
            .preview(name, &self.shutdown.child_token())
            .await
    }

    /// Apply tag actions to a batch of customers
    pub async fn apply_tags(
        &self,
        identifiers: &[CustomerId],
        actions: &[TagAction],
    ) -> DirectoryResult<BulkTagOutcome> {
        self.mutator
            .apply(identifiers, actions, &self.shutdown.child_token())
            .await
    }

    /// Run a rule
    pub async fn execute_rule(&self, rule: &TaggingRule) -> DirectoryResult<RuleExecutionResult> {
        self.rules.execute(rule, &self.shutdown.child_token()).await
    }

    /// Run a stored rule
    pub async fn execute_rule_by_id(&self, id: &str) -> DirectoryResult<RuleExecutionResult> {
        self.rules
            .execute_by_id(id, &self.shutdown.child_token())
            .await
    }

    /// Run every active stored rule
    pub async fn execute_active_rules(
        &self,
    ) -> DirectoryResult<Vec<(String, DirectoryResult<RuleExecutionResult>)>> {
        self.rules
            .execute_active_rules(&self.shutdown.child_token())
            .await
    }

    /// Metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Cancel every operation started through this client.
    ///
    /// In-flight requests finish; no new ones are issued and the partial
    /// results are returned to their callers.
    pub fn shutdown(&self) {
        info!("Cancelling directory operations");
        self.shutdown.cancel();
    }

    /// Whether [`Self::shutdown`] has been called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("config", &self.config)
            .field("throttler", &self.throttler)
            .finish()
    }
}
