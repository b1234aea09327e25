//! Tagging rule types.

use super::{BulkTagOutcome, TagAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored trigger segment plus tag actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggingRule {
    /// Rule ID
    pub id: String,
    /// Rule name
    pub name: String,
    /// Whether the rule may run
    pub active: bool,
    /// Segment whose members the rule applies to
    pub trigger_segment: String,
    /// Actions applied in order
    pub actions: Vec<TagAction>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl TaggingRule {
    /// Create an active rule
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger_segment: impl Into<String>,
        actions: Vec<TagAction>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
            trigger_segment: trigger_segment.into(),
            actions,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Outcome of one rule run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExecutionResult {
    /// Unique ID of this run
    pub run_id: Uuid,
    /// Rule ID
    pub rule_id: String,
    /// Rule name
    pub rule_name: String,
    /// Trigger segment
    pub segment: String,
    /// Identifiers handed to the bulk mutator
    pub customers_processed: usize,
    /// Per-identifier mutation outcome
    pub outcome: BulkTagOutcome,
    /// Segment sync stopped before end of data or failed mid-walk
    pub partial: bool,
    /// Why the segment sync did not complete, when it did not
    pub sync_error: Option<String>,
    /// When the run finished
    pub executed_at: DateTime<Utc>,
}
