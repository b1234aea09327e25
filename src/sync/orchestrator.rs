//! Segment sync: resolve, walk to completion, report progress, cache.

use super::segments::{Resolution, SegmentResolver, SegmentSummary};
use super::walker::{CursorWalker, SyncAccumulator};
use crate::errors::{DirectoryError, DirectoryResult};
use crate::store::SyncStore;
use crate::types::{CustomerRecord, SyncProgress, SyncResult, SyncState, WalkTermination};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Receives progress after every page of a sync
pub trait SyncObserver: Send + Sync {
    /// Called once per completed page
    fn on_progress(&self, progress: &SyncProgress);
}

impl<F> SyncObserver for F
where
    F: Fn(&SyncProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &SyncProgress) {
        self(progress)
    }
}

impl SyncObserver for mpsc::UnboundedSender<SyncProgress> {
    fn on_progress(&self, progress: &SyncProgress) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(progress.clone());
    }
}

impl SyncObserver for mpsc::Sender<SyncProgress> {
    fn on_progress(&self, progress: &SyncProgress) {
        // Progress is advisory; a full channel drops the update.
        let _ = self.try_send(progress.clone());
    }
}

/// Produces complete, deduplicated segment member lists
pub struct SyncOrchestrator {
    walker: CursorWalker,
    resolver: SegmentResolver,
    store: Arc<dyn SyncStore>,
    cache_ttl: Duration,
    states: RwLock<HashMap<String, SyncState>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator
    pub fn new(
        walker: CursorWalker,
        resolver: SegmentResolver,
        store: Arc<dyn SyncStore>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            walker,
            resolver,
            store,
            cache_ttl,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Segment table with configuration status
    pub fn list_segments(&self) -> Vec<SegmentSummary> {
        self.resolver.list()
    }

    /// Current state for a segment; `Idle` if never synced
    pub fn state(&self, segment: &str) -> SyncState {
        let key = self.resolver.canonical_name(segment);
        self.states
            .read()
            .get(&key)
            .copied()
            .unwrap_or(SyncState::Idle)
    }

    fn set_state(&self, key: &str, state: SyncState) {
        self.states.write().insert(key.to_string(), state);
    }

    /// Sync a segment.
    ///
    /// An unknown segment name yields an empty result. A known segment with
    /// no configured filter fails with [`DirectoryError::UnresolvedSegment`].
    /// Unless `force_refresh` is set, a cached result younger than the TTL is
    /// returned without touching the upstream. Cancellation returns the
    /// records gathered so far; a fatal page error returns
    /// [`DirectoryError::WalkAborted`] carrying them.
    #[instrument(skip(self, observer, cancel), fields(segment = %name))]
    pub async fn sync(
        &self,
        name: &str,
        force_refresh: bool,
        observer: Option<&dyn SyncObserver>,
        cancel: &CancellationToken,
    ) -> DirectoryResult<SyncResult> {
        let key = self.resolver.canonical_name(name);

        let filter = match self.resolver.resolve(name) {
            Resolution::Filter(filter) => filter,
            Resolution::Unknown => {
                warn!(segment = %key, "Unknown segment, returning empty result");
                return Ok(SyncResult::empty(key));
            }
            Resolution::Unconfigured => {
                self.set_state(&key, SyncState::Failed);
                return Err(DirectoryError::UnresolvedSegment { segment: key });
            }
        };

        if !force_refresh {
            match self.store.get_cached_sync(&key).await {
                Ok(Some(cached)) => {
                    info!(segment = %key, records = cached.actual_count, "Serving cached sync");
                    self.set_state(&key, SyncState::Idle);
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(error) => warn!(segment = %key, %error, "Cache lookup failed, walking upstream"),
            }
        }

        let mut walk = self.walker.walk(filter, cancel.clone());
        let mut acc = SyncAccumulator::new(key.clone());

        loop {
            self.set_state(
                &key,
                SyncState::Fetching {
                    page: walk.pages_fetched(),
                },
            );

            match walk.next_page().await {
                Ok(Some(page)) => {
                    acc.push_page(page);
                    if let Some(observer) = observer {
                        observer.on_progress(&SyncProgress {
                            segment: key.clone(),
                            pages_completed: acc.pages(),
                            records_so_far: acc.len(),
                            expected_count: acc.expected_count(),
                        });
                    }
                }
                Ok(None) => break,
                Err(source) => {
                    self.set_state(&key, SyncState::Failed);
                    let retrieved = acc.len();
                    warn!(segment = %key, retrieved, error = %source, "Sync aborted");
                    return Err(DirectoryError::WalkAborted {
                        segment: key,
                        retrieved,
                        partial: Box::new(acc.finish(WalkTermination::Aborted)),
                        source: Box::new(source),
                    });
                }
            }
        }

        let termination = walk.termination().unwrap_or(WalkTermination::EndOfData);
        let duplicates = acc.duplicates();
        let result = acc.finish(termination);

        self.set_state(
            &key,
            match termination {
                WalkTermination::EndOfData => SyncState::Complete,
                _ => SyncState::PartialComplete,
            },
        );

        info!(
            segment = %key,
            records = result.actual_count,
            expected = ?result.expected_count,
            pages = result.pages,
            duplicates,
            ?termination,
            "Sync finished"
        );

        if termination != WalkTermination::Cancelled {
            if let Err(error) = self.store.put_cached_sync(&key, &result, self.cache_ttl).await {
                warn!(segment = %key, %error, "Failed to cache sync result");
            }
        }

        Ok(result)
    }

    /// First page of a segment, at most the preview size.
    ///
    /// Bypasses the cache and leaves the segment's state untouched.
    #[instrument(skip(self, cancel), fields(segment = %name))]
    pub async fn preview(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> DirectoryResult<Vec<CustomerRecord>> {
        let filter = match self.resolver.resolve(name) {
            Resolution::Filter(filter) => filter,
            Resolution::Unknown => return Ok(Vec::new()),
            Resolution::Unconfigured => {
                return Err(DirectoryError::UnresolvedSegment {
                    segment: self.resolver.canonical_name(name),
                })
            }
        };

        let size = self.walker.config().preview_size;
        let mut walk = self.walker.walk_with(filter, size, 1, cancel.clone());
        let mut records = walk
            .next_page()
            .await?
            .map(|page| page.records)
            .unwrap_or_default();
        records.truncate(size as usize);
        Ok(records)
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("walker", &self.walker)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}
