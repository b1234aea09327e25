//! Segment name to upstream filter mapping.

use serde::{Deserialize, Serialize};

/// A named segment and the upstream search expression that selects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDefinition {
    /// Display name, matched case-insensitively
    pub name: String,
    /// Upstream search expression; `None` means the mapping must come from
    /// configuration before the segment can be synced
    pub filter: Option<String>,
    /// Short human description
    pub description: String,
}

impl SegmentDefinition {
    /// Create a segment definition
    pub fn new(name: &str, filter: Option<String>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            filter,
            description: description.to_string(),
        }
    }

    /// Whether a filter is configured
    pub fn is_configured(&self) -> bool {
        self.filter.is_some()
    }
}

/// Built-in segment table
pub fn default_segments() -> Vec<SegmentDefinition> {
    vec![
        SegmentDefinition::new(
            "New Customers",
            Some("customer_date:>=-30d".to_string()),
            "Customers created in the last 30 days",
        ),
        SegmentDefinition::new("VIP", Some("tag:VIP".to_string()), "Customers tagged VIP"),
        SegmentDefinition::new(
            "Subscribers",
            Some("accepts_marketing:true".to_string()),
            "Customers who accept marketing email",
        ),
        // No agreed threshold upstream; supply DIRECTORY_SEGMENT_REPEAT_BUYERS.
        SegmentDefinition::new("Repeat Buyers", None, "Customers with more than one order"),
    ]
}

/// Result of resolving a segment name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Known segment with its filter
    Filter(String),
    /// Known segment without a configured filter
    Unconfigured,
    /// Name not in the table
    Unknown,
}

/// Listing entry for `list_segments`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Segment name
    pub name: String,
    /// Description
    pub description: String,
    /// Whether the segment can be synced
    pub configured: bool,
}

/// Resolves segment names against a fixed table
#[derive(Debug, Clone)]
pub struct SegmentResolver {
    segments: Vec<SegmentDefinition>,
}

impl SegmentResolver {
    /// Create a resolver over the given table
    pub fn new(segments: Vec<SegmentDefinition>) -> Self {
        Self { segments }
    }

    /// Resolve a name, ignoring case and surrounding whitespace
    pub fn resolve(&self, name: &str) -> Resolution {
        let name = name.trim();
        match self
            .segments
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(SegmentDefinition {
                filter: Some(filter),
                ..
            }) => Resolution::Filter(filter.clone()),
            Some(_) => Resolution::Unconfigured,
            None => Resolution::Unknown,
        }
    }

    /// Canonical name for a segment, used as the cache key
    pub fn canonical_name(&self, name: &str) -> String {
        let trimmed = name.trim();
        self.segments
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(trimmed))
            .map_or_else(|| trimmed.to_string(), |s| s.name.clone())
    }

    /// All segments in table order
    pub fn list(&self) -> Vec<SegmentSummary> {
        self.segments
            .iter()
            .map(|s| SegmentSummary {
                name: s.name.clone(),
                description: s.description.clone(),
                configured: s.is_configured(),
            })
            .collect()
    }
}

impl Default for SegmentResolver {
    fn default() -> Self {
        Self::new(default_segments())
    }
}
