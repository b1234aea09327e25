//! Bulk tag mutation with per-record fault isolation.
//!
//! Each identifier is read, its tags are folded through the actions, and the
//! result is written back only when it differs. Up to `concurrency`
//! identifiers are in flight at once; all of them draw from the same
//! throttler as pagination. Outcomes are collected into slots by input
//! index so the error list keeps input order.

use crate::errors::{DirectoryError, DirectoryResult, ValidationError};
use crate::resilience::{RequestExecutor, RequestKind};
use crate::services::CustomerDirectory;
use crate::types::{BulkTagOutcome, CustomerId, TagAction};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Upper bound on concurrent identifier updates
pub const MAX_CONCURRENCY: usize = 8;

/// Bulk mutation settings
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Identifiers processed concurrently (1..=8)
    pub concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug)]
enum RecordOutcome {
    Updated,
    Unchanged,
    Failed { message: String, cancelled: bool },
}

/// Applies tag actions to batches of customers
pub struct BulkMutator {
    directory: Arc<dyn CustomerDirectory>,
    executor: Arc<RequestExecutor>,
    concurrency: usize,
}

impl BulkMutator {
    /// Create a mutator; concurrency is clamped to `1..=MAX_CONCURRENCY`
    pub fn new(
        directory: Arc<dyn CustomerDirectory>,
        executor: Arc<RequestExecutor>,
        config: BulkConfig,
    ) -> Self {
        Self {
            directory,
            executor,
            concurrency: config.concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    /// Effective concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Apply `actions` to every identifier.
    ///
    /// Invalid input fails before any upstream call. After that an outcome
    /// is always returned: a failing identifier never stops the rest, and on
    /// cancellation identifiers not yet started are counted as failed.
    #[instrument(skip(self, identifiers, actions, cancel), fields(identifiers = identifiers.len(), actions = actions.len()))]
    pub async fn apply(
        &self,
        identifiers: &[CustomerId],
        actions: &[TagAction],
        cancel: &CancellationToken,
    ) -> DirectoryResult<BulkTagOutcome> {
        if actions.is_empty() {
            return Err(ValidationError::EmptyActions.into());
        }
        if identifiers.iter().any(|id| id.as_str().trim().is_empty()) {
            return Err(ValidationError::EmptyIdentifier.into());
        }

        let mut slots: Vec<Option<RecordOutcome>> = identifiers.iter().map(|_| None).collect();

        let mut results = stream::iter(identifiers.iter().enumerate())
            .map(|(index, id)| async move { (index, self.process(id, actions, cancel).await) })
            .buffer_unordered(self.concurrency);

        while let Some((index, outcome)) = results.next().await {
            slots[index] = Some(outcome);
        }

        let mut outcome = BulkTagOutcome::default();
        for (id, slot) in identifiers.iter().zip(slots) {
            match slot {
                Some(RecordOutcome::Updated) => outcome.succeeded += 1,
                Some(RecordOutcome::Unchanged) => {
                    outcome.succeeded += 1;
                    outcome.unchanged += 1;
                }
                Some(RecordOutcome::Failed { message, cancelled }) => {
                    outcome.failed += 1;
                    outcome.errors.push(message);
                    outcome.cancelled |= cancelled;
                }
                None => {
                    outcome.failed += 1;
                    outcome.errors.push(format!("{id}: not processed"));
                }
            }
        }

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            unchanged = outcome.unchanged,
            cancelled = outcome.cancelled,
            "Bulk tag update finished"
        );

        Ok(outcome)
    }

    async fn process(
        &self,
        id: &CustomerId,
        actions: &[TagAction],
        cancel: &CancellationToken,
    ) -> RecordOutcome {
        if cancel.is_cancelled() {
            return RecordOutcome::Failed {
                message: format!("{id}: cancelled before processing"),
                cancelled: true,
            };
        }

        let current = match self
            .executor
            .execute("customers.get", RequestKind::RecordRead, cancel, || {
                self.directory.get_customer(id)
            })
            .await
        {
            Ok(record) => record,
            Err(error) => return failed(id, "read failed", error),
        };

        let updated = current.tags.apply(actions);
        if updated == current.tags {
            debug!(customer_id = %id, "Tags already up to date, skipping write");
            return RecordOutcome::Unchanged;
        }

        match self
            .executor
            .execute("customers.update", RequestKind::RecordWrite, cancel, || {
                self.directory.update_tags(id, &updated)
            })
            .await
        {
            Ok(()) => {
                debug!(customer_id = %id, tags = %updated, "Updated tags");
                RecordOutcome::Updated
            }
            Err(error) => failed(id, "write failed", error),
        }
    }
}

fn failed(id: &CustomerId, stage: &str, error: DirectoryError) -> RecordOutcome {
    let cancelled = matches!(error, DirectoryError::Cancelled);
    if !cancelled {
        warn!(customer_id = %id, stage, error = %error, "Tag update failed");
    }
    RecordOutcome::Failed {
        message: format!("{id}: {stage}: {error}"),
        cancelled,
    }
}

impl std::fmt::Debug for BulkMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkMutator")
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_is_clamped() {
        let directory = Arc::new(crate::mocks::MockDirectory::new());
        let executor = Arc::new(crate::fixtures::unthrottled_executor());

        let high = BulkMutator::new(directory.clone(), executor.clone(), BulkConfig { concurrency: 64 });
        assert_eq!(high.concurrency(), MAX_CONCURRENCY);

        let zero = BulkMutator::new(directory, executor, BulkConfig { concurrency: 0 });
        assert_eq!(zero.concurrency(), 1);
    }
}
