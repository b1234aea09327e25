//! Request types and GraphQL documents for the customers service.

use crate::types::{CustomerId, PageCursor, TagSet};
use serde_json::{json, Value};

/// List customers matching a filter, one page at a time
pub(crate) const LIST_CUSTOMERS_QUERY: &str = r#"
query ListCustomers($first: Int!, $after: String, $query: String) {
  customers(first: $first, after: $after, query: $query) {
    nodes {
      id
      displayName
      email
      tags
      numberOfOrders
      amountSpent { amount currencyCode }
      createdAt
    }
    pageInfo { hasNextPage endCursor }
  }
  customersCount(query: $query) { count }
}
"#;

/// Read one customer
pub(crate) const GET_CUSTOMER_QUERY: &str = r#"
query GetCustomer($id: ID!) {
  customer(id: $id) {
    id
    displayName
    email
    tags
    numberOfOrders
    amountSpent { amount currencyCode }
    createdAt
  }
}
"#;

/// Replace a customer's full tag list
pub(crate) const UPDATE_TAGS_MUTATION: &str = r#"
mutation UpdateCustomerTags($input: CustomerInput!) {
  customerUpdate(input: $input) {
    customer { id tags }
    userErrors { field message }
  }
}
"#;

/// Request for one page of a customer listing
#[derive(Debug, Clone)]
pub struct ListCustomersRequest {
    /// Upstream search expression; `None` lists everyone
    pub filter: Option<String>,
    /// Records per page
    pub page_size: u32,
    /// Where to resume; `None` starts at the first page
    pub cursor: Option<PageCursor>,
}

impl ListCustomersRequest {
    /// First page of a listing
    pub fn first_page(filter: Option<String>, page_size: u32) -> Self {
        Self {
            filter,
            page_size,
            cursor: None,
        }
    }

    /// Continue from a cursor
    pub fn after(mut self, cursor: PageCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Index of the page this request fetches
    pub fn page_index(&self) -> u32 {
        self.cursor.as_ref().map_or(0, |c| c.index)
    }

    pub(crate) fn variables(&self) -> Value {
        json!({
            "first": self.page_size,
            "after": self.cursor.as_ref().map(|c| c.token.as_str()),
            "query": self.filter,
        })
    }
}

pub(crate) fn get_customer_variables(id: &CustomerId) -> Value {
    json!({ "id": id.as_str() })
}

pub(crate) fn update_tags_variables(id: &CustomerId, tags: &TagSet) -> Value {
    json!({
        "input": {
            "id": id.as_str(),
            "tags": tags.as_slice(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_variables() {
        let request = ListCustomersRequest::first_page(Some("tag:VIP".into()), 50).after(
            PageCursor {
                token: "abc".into(),
                index: 3,
            },
        );
        assert_eq!(request.page_index(), 3);
        assert_eq!(
            request.variables(),
            json!({"first": 50, "after": "abc", "query": "tag:VIP"})
        );
    }

    #[test]
    fn test_first_page_has_null_cursor() {
        let request = ListCustomersRequest::first_page(None, 10);
        assert_eq!(request.page_index(), 0);
        assert_eq!(request.variables()["after"], Value::Null);
    }

    #[test]
    fn test_update_variables_send_full_list() {
        let vars = update_tags_variables(&CustomerId::new("gid://c/1"), &TagSet::parse("a, b"));
        assert_eq!(vars["input"]["tags"], json!(["a", "b"]));
    }
}
