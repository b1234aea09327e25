//! Tagging rule execution.
//!
//! A rule run syncs the rule's trigger segment and hands the resulting
//! identifiers to the bulk mutator. A partial or aborted sync still runs the
//! mutation over whatever was retrieved and flags the result as partial.

use crate::bulk::BulkMutator;
use crate::errors::{DirectoryError, DirectoryResult, ValidationError};
use crate::store::SyncStore;
use crate::sync::SyncOrchestrator;
use crate::types::{RuleExecutionResult, TaggingRule};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

/// Runs tagging rules
pub struct RuleExecutor {
    orchestrator: Arc<SyncOrchestrator>,
    mutator: Arc<BulkMutator>,
    store: Arc<dyn SyncStore>,
}

impl RuleExecutor {
    /// Create an executor
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        mutator: Arc<BulkMutator>,
        store: Arc<dyn SyncStore>,
    ) -> Self {
        Self {
            orchestrator,
            mutator,
            store,
        }
    }

    /// Run one rule.
    ///
    /// An inactive rule fails with [`DirectoryError::RuleInactive`] and a rule
    /// without actions with [`ValidationError::EmptyActions`], both before any
    /// upstream call. The trigger segment is always synced fresh.
    ///
    /// A sync that stops at the page ceiling or aborts mid-walk still tags the
    /// members retrieved and flags the result as partial. A segment that
    /// cannot be synced at all (no configured filter) retrieved nothing to
    /// tag, so its [`DirectoryError::UnresolvedSegment`] is returned as is.
    #[instrument(
        skip(self, rule, cancel),
        fields(rule_id = %rule.id, rule = %rule.name, segment = %rule.trigger_segment, run_id = tracing::field::Empty)
    )]
    pub async fn execute(
        &self,
        rule: &TaggingRule,
        cancel: &CancellationToken,
    ) -> DirectoryResult<RuleExecutionResult> {
        if !rule.active {
            return Err(DirectoryError::RuleInactive {
                id: rule.id.clone(),
            });
        }

        if rule.actions.is_empty() {
            return Err(ValidationError::EmptyActions.into());
        }

        let run_id = Uuid::new_v4();
        Span::current().record("run_id", tracing::field::display(run_id));

        let (sync, sync_error) = match self
            .orchestrator
            .sync(&rule.trigger_segment, true, None, cancel)
            .await
        {
            Ok(sync) => (sync, None),
            Err(DirectoryError::WalkAborted {
                partial, source, ..
            }) => {
                warn!(retrieved = partial.actual_count, error = %source, "Segment sync aborted, tagging partial list");
                (*partial, Some(source.to_string()))
            }
            Err(error) => return Err(error),
        };

        let partial = sync.is_incomplete() || sync_error.is_some();
        let identifiers = sync.identifiers();

        let outcome = if identifiers.is_empty() {
            Default::default()
        } else {
            self.mutator.apply(&identifiers, &rule.actions, cancel).await?
        };

        info!(
            processed = identifiers.len(),
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            partial,
            "Rule executed"
        );

        Ok(RuleExecutionResult {
            run_id,
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            segment: sync.segment,
            customers_processed: identifiers.len(),
            outcome,
            partial,
            sync_error,
            executed_at: Utc::now(),
        })
    }

    /// Load a rule from the store and run it
    pub async fn execute_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> DirectoryResult<RuleExecutionResult> {
        let rule = self
            .store
            .get_rule(id)
            .await?
            .ok_or_else(|| DirectoryError::NotFound {
                resource: "Rule",
                id: id.to_string(),
            })?;
        self.execute(&rule, cancel).await
    }

    /// Run every active rule in store order.
    ///
    /// Each rule's result is returned independently; one failing rule does
    /// not stop the others. Stops starting new rules once cancelled.
    pub async fn execute_active_rules(
        &self,
        cancel: &CancellationToken,
    ) -> DirectoryResult<Vec<(String, DirectoryResult<RuleExecutionResult>)>> {
        let rules = self.store.list_active_rules().await?;
        let mut results = Vec::with_capacity(rules.len());

        for rule in rules {
            if cancel.is_cancelled() {
                break;
            }
            let result = self.execute(&rule, cancel).await;
            if let Err(error) = &result {
                warn!(rule_id = %rule.id, %error, "Rule run failed");
            }
            results.push((rule.id, result));
        }

        Ok(results)
    }
}

impl std::fmt::Debug for RuleExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleExecutor")
            .field("orchestrator", &self.orchestrator)
            .field("mutator", &self.mutator)
            .finish()
    }
}
