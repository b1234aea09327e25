//! Raw upstream shapes for the customers service and their normalization.
//!
//! Nothing in this module leaves the service: every payload is converted
//! into [`CustomerRecord`] / [`CustomerPage`] before it is returned.

use crate::errors::ResponseError;
use crate::types::{CustomerId, CustomerPage, CustomerRecord, Money, TagSet};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Tags arrive either as a list or as a comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawTags {
    List(Vec<String>),
    Joined(String),
}

impl Default for RawTags {
    fn default() -> Self {
        RawTags::List(Vec::new())
    }
}

impl RawTags {
    fn normalize(self) -> TagSet {
        match self {
            RawTags::List(tags) => tags.into_iter().collect(),
            RawTags::Joined(raw) => TagSet::parse(&raw),
        }
    }
}

/// Counts are serialized as strings for 64-bit values
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCount {
    Number(u64),
    Text(String),
}

impl RawCount {
    fn value(&self) -> u64 {
        match self {
            RawCount::Number(n) => *n,
            RawCount::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawMoney {
    amount: String,
    currency_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCustomer {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    tags: RawTags,
    #[serde(default)]
    number_of_orders: Option<RawCount>,
    #[serde(default)]
    amount_spent: Option<RawMoney>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl RawCustomer {
    pub(crate) fn normalize(self) -> Result<CustomerRecord, ResponseError> {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ResponseError::MissingField { field: "customer.id" })?;

        Ok(CustomerRecord {
            id: CustomerId::new(id),
            display_name: self.display_name.unwrap_or_default().trim().to_string(),
            email: self.email.unwrap_or_default().trim().to_string(),
            tags: self.tags.normalize(),
            orders_count: self.number_of_orders.map_or(0, |c| c.value()),
            amount_spent: self.amount_spent.map(|m| Money {
                amount: m.amount,
                currency_code: m.currency_code,
            }),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawConnection {
    #[serde(default)]
    nodes: Vec<RawCustomer>,
    #[serde(rename = "pageInfo")]
    page_info: RawPageInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCountNode {
    count: RawCount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListCustomersData {
    customers: RawConnection,
    #[serde(default)]
    customers_count: Option<RawCountNode>,
}

impl ListCustomersData {
    pub(crate) fn into_page(self, index: u32) -> Result<CustomerPage, ResponseError> {
        let records = self
            .customers
            .nodes
            .into_iter()
            .map(RawCustomer::normalize)
            .collect::<Result<Vec<_>, _>>()?;

        let info = self.customers.page_info;
        let next_cursor = if info.has_next_page {
            Some(
                info.end_cursor
                    .filter(|c| !c.is_empty())
                    .ok_or(ResponseError::MissingField {
                        field: "pageInfo.endCursor",
                    })?,
            )
        } else {
            None
        };

        Ok(CustomerPage {
            index,
            records,
            next_cursor,
            expected_count: self.customers_count.map(|c| c.count.value()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetCustomerData {
    #[serde(default)]
    pub(crate) customer: Option<RawCustomer>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUserError {
    #[serde(default)]
    pub(crate) field: Option<Vec<String>>,
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCustomerUpdate {
    #[serde(default)]
    pub(crate) user_errors: Vec<RawUserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateTagsData {
    pub(crate) customer_update: Option<RawCustomerUpdate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalizes_joined_tags_and_string_counts() {
        let raw: RawCustomer = serde_json::from_value(json!({
            "id": "gid://customer/1",
            "displayName": " Ada Lovelace ",
            "email": null,
            "tags": "VIP,  , New, VIP",
            "numberOfOrders": "12",
        }))
        .unwrap();

        let record = raw.normalize().unwrap();
        assert_eq!(record.display_name, "Ada Lovelace");
        assert_eq!(record.email, "");
        assert_eq!(record.tags.as_slice(), &["VIP", "New"]);
        assert_eq!(record.orders_count, 12);
    }

    #[test]
    fn test_rejects_missing_id() {
        let raw: RawCustomer = serde_json::from_value(json!({"id": "  ", "tags": []})).unwrap();
        assert!(raw.normalize().is_err());
    }

    #[test]
    fn test_page_without_next_is_last() {
        let data: ListCustomersData = serde_json::from_value(json!({
            "customers": {
                "nodes": [{"id": "1", "tags": ["a"]}, {"id": "2", "tags": []}],
                "pageInfo": {"hasNextPage": false, "endCursor": "zz"}
            },
            "customersCount": {"count": 2}
        }))
        .unwrap();

        let page = data.into_page(0).unwrap();
        assert!(page.is_last());
        assert_eq!(page.len(), 2);
        assert_eq!(page.expected_count, Some(2));
    }

    #[test]
    fn test_next_page_without_cursor_is_an_error() {
        let data: ListCustomersData = serde_json::from_value(json!({
            "customers": {"nodes": [], "pageInfo": {"hasNextPage": true, "endCursor": null}}
        }))
        .unwrap();
        assert!(data.into_page(0).is_err());
    }
}
