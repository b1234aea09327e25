//! Customer record types.

use super::TagSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream-assigned customer identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl CustomerId {
    /// Create a new customer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CustomerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CustomerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monetary amount as reported upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Decimal amount, kept as the upstream string
    pub amount: String,
    /// ISO currency code
    pub currency_code: String,
}

/// Normalized snapshot of an upstream customer.
///
/// Never mutated in place; a tag change produces a new record through
/// [`CustomerRecord::with_tags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Customer ID
    pub id: CustomerId,
    /// Display name (may be empty)
    #[serde(default)]
    pub display_name: String,
    /// Email (may be empty)
    #[serde(default)]
    pub email: String,
    /// Tags
    #[serde(default)]
    pub tags: TagSet,
    /// Number of orders placed
    #[serde(default)]
    pub orders_count: u64,
    /// Lifetime spend
    #[serde(default)]
    pub amount_spent: Option<Money>,
    /// Signup time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CustomerRecord {
    /// Create a record with only an identifier and tags
    pub fn new(id: impl Into<CustomerId>, tags: TagSet) -> Self {
        Self {
            id: id.into(),
            display_name: String::new(),
            email: String::new(),
            tags,
            orders_count: 0,
            amount_spent: None,
            created_at: None,
        }
    }

    /// Copy of this record with a different tag set
    pub fn with_tags(&self, tags: TagSet) -> Self {
        Self {
            tags,
            ..self.clone()
        }
    }

    /// Best label for display
    pub fn label(&self) -> &str {
        if !self.display_name.is_empty() {
            &self.display_name
        } else if !self.email.is_empty() {
            &self.email
        } else {
            self.id.as_str()
        }
    }
}
