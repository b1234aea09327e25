//! Test fixtures for directory records, rules and upstream payloads.

use crate::config::DirectoryConfig;
use crate::observability::MetricsCollector;
use crate::resilience::{RequestExecutor, RetryConfig, RetryPolicy, ThrottleConfig, Throttler};
use crate::types::{CustomerId, CustomerRecord, Money, TagAction, TagSet, TaggingRule};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

/// A fully populated customer
pub fn customer(id: &str, tags: &str) -> CustomerRecord {
    CustomerRecord {
        id: CustomerId::new(id),
        display_name: "Grace Hopper".to_string(),
        email: "grace@example.com".to_string(),
        tags: TagSet::parse(tags),
        orders_count: 3,
        amount_spent: Some(Money {
            amount: "129.50".to_string(),
            currency_code: "USD".to_string(),
        }),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single(),
    }
}

/// Rule adding the `New` tag to the "New Customers" segment
pub fn welcome_rule() -> TaggingRule {
    let actions = TagAction::add("New").map(|a| vec![a]).unwrap_or_default();
    TaggingRule::new("rule-welcome", "Welcome new customers", "New Customers", actions)
}

/// Client configuration with a token and default limits
pub fn config() -> DirectoryConfig {
    DirectoryConfig::builder()
        .access_token("shpat_fixture")
        .build_unchecked()
}

/// Executor with no throttling and the default retry policy
pub fn unthrottled_executor() -> RequestExecutor {
    executor(ThrottleConfig::unlimited(), RetryConfig::default())
}

/// Executor over the given settings, with its own metrics
pub fn executor(throttle: ThrottleConfig, retry: RetryConfig) -> RequestExecutor {
    RequestExecutor::new(
        Arc::new(Throttler::new(throttle)),
        RetryPolicy::new(retry),
        Arc::new(MetricsCollector::new()),
    )
}

/// GraphQL body for one customer listing page
pub fn customers_page_body(ids: &[&str], next_cursor: Option<&str>, total: u64) -> Value {
    json!({
        "data": {
            "customers": {
                "nodes": ids.iter().map(|id| json!({
                    "id": id,
                    "displayName": format!("Customer {id}"),
                    "email": format!("{id}@example.com"),
                    "tags": ["Existing"],
                    "numberOfOrders": "1",
                    "amountSpent": {"amount": "10.00", "currencyCode": "USD"},
                    "createdAt": "2024-03-01T12:00:00Z"
                })).collect::<Vec<_>>(),
                "pageInfo": {"hasNextPage": next_cursor.is_some(), "endCursor": next_cursor}
            },
            "customersCount": {"count": total}
        },
        "extensions": {"cost": {
            "requestedQueryCost": 52,
            "actualQueryCost": 12,
            "throttleStatus": {"maximumAvailable": 1000.0, "currentlyAvailable": 988.0, "restoreRate": 50.0}
        }}
    })
}

/// GraphQL body for a single customer read
pub fn customer_body(id: &str, tags: &[&str]) -> Value {
    json!({"data": {"customer": {"id": id, "tags": tags}}})
}

/// GraphQL body for a successful tag update
pub fn update_ok_body(id: &str, tags: &[&str]) -> Value {
    json!({"data": {"customerUpdate": {"customer": {"id": id, "tags": tags}, "userErrors": []}}})
}
