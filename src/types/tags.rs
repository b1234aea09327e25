//! Tag sets, tag actions and bulk tagging outcomes.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered set of distinct, trimmed, non-blank tags.
///
/// Order is insertion order: tags parsed from an upstream tag string keep
/// the upstream order, tags added later go to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(Vec<String>);

impl TagSet {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an upstream comma-separated tag string
    pub fn parse(raw: &str) -> Self {
        raw.split(',').collect()
    }

    /// Whether the tag is present
    pub fn contains(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.0.iter().any(|t| t == tag)
    }

    /// Insert a tag if absent. Returns whether the set changed.
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    /// Remove every occurrence of a tag. Returns whether the set changed.
    pub fn remove(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        before != self.0.len()
    }

    /// Fold a list of actions over this set, in list order
    pub fn apply(&self, actions: &[TagAction]) -> TagSet {
        let mut next = self.clone();
        for action in actions {
            match action.kind {
                TagActionKind::Add => next.insert(&action.tag),
                TagActionKind::Remove => next.remove(&action.tag),
            };
        }
        next
    }

    /// Render as the upstream tag string
    pub fn to_upstream_string(&self) -> String {
        self.0.join(", ")
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate tags in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Tags as a slice
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.0
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_upstream_string())
    }
}

/// Kind of tag mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagActionKind {
    /// Insert the tag if absent
    Add,
    /// Delete all occurrences of the tag
    Remove,
}

impl fmt::Display for TagActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// A single validated tag mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTagAction")]
pub struct TagAction {
    kind: TagActionKind,
    tag: String,
}

impl TagAction {
    /// Create an action, trimming and validating the tag
    pub fn new(kind: TagActionKind, tag: &str) -> Result<Self, ValidationError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag);
        }
        if tag.contains(',') {
            return Err(ValidationError::TagContainsComma {
                tag: tag.to_string(),
            });
        }
        Ok(Self {
            kind,
            tag: tag.to_string(),
        })
    }

    /// Add action
    pub fn add(tag: &str) -> Result<Self, ValidationError> {
        Self::new(TagActionKind::Add, tag)
    }

    /// Remove action
    pub fn remove(tag: &str) -> Result<Self, ValidationError> {
        Self::new(TagActionKind::Remove, tag)
    }

    /// Action kind
    pub fn kind(&self) -> TagActionKind {
        self.kind
    }

    /// Normalized tag
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for TagAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.tag)
    }
}

#[derive(Deserialize)]
struct RawTagAction {
    kind: TagActionKind,
    tag: String,
}

impl TryFrom<RawTagAction> for TagAction {
    type Error = ValidationError;

    fn try_from(raw: RawTagAction) -> Result<Self, Self::Error> {
        TagAction::new(raw.kind, &raw.tag)
    }
}

/// Result of applying tag actions to a batch of customers.
///
/// `succeeded + failed` always equals the number of input identifiers and
/// `errors.len()` equals `failed`. Errors are in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTagOutcome {
    /// Identifiers processed without error (written or already correct)
    pub succeeded: usize,
    /// Identifiers whose read or write failed
    pub failed: usize,
    /// Subset of `succeeded` whose tag set was already correct
    pub unchanged: usize,
    /// Per-identifier failure messages, in input order
    pub errors: Vec<String>,
    /// Whether processing stopped early because of cancellation
    pub cancelled: bool,
}

impl BulkTagOutcome {
    /// Total identifiers accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Whether every identifier succeeded
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }
}
