//! Customers service implementation.

use super::requests::{
    get_customer_variables, update_tags_variables, ListCustomersRequest, GET_CUSTOMER_QUERY,
    LIST_CUSTOMERS_QUERY, UPDATE_TAGS_MUTATION,
};
use super::responses::{GetCustomerData, ListCustomersData, UpdateTagsData};
use crate::config::DirectoryConfig;
use crate::errors::{
    ConfigurationError, DirectoryError, DirectoryResult, RequestError, ResponseError,
};
use crate::resilience::Throttler;
use crate::transport::{GraphQlRequest, GraphQlResponse, HttpTransport};
use crate::types::{CustomerId, CustomerPage, CustomerRecord, TagSet};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Header carrying the access token
pub const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";

/// Upstream customer directory operations.
///
/// Implementations make exactly one upstream call per method and never
/// retry; throttling and retries are layered on by the callers.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Fetch one page of a filtered listing
    async fn list_page(&self, request: ListCustomersRequest) -> DirectoryResult<CustomerPage>;

    /// Read one customer
    async fn get_customer(&self, id: &CustomerId) -> DirectoryResult<CustomerRecord>;

    /// Replace a customer's tag list
    async fn update_tags(&self, id: &CustomerId, tags: &TagSet) -> DirectoryResult<()>;
}

/// GraphQL-backed customer directory
#[derive(Clone)]
pub struct CustomersService {
    transport: Arc<dyn HttpTransport>,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
    throttler: Option<Arc<Throttler>>,
}

impl CustomersService {
    /// Create a new customers service
    pub fn new(transport: Arc<dyn HttpTransport>, config: &DirectoryConfig) -> DirectoryResult<Self> {
        let token = config
            .access_token()
            .ok_or(ConfigurationError::MissingToken)?;

        let mut token_value = HeaderValue::from_str(token).map_err(|_| {
            ConfigurationError::InvalidConfiguration {
                message: "Access token contains invalid header characters".to_string(),
            }
        })?;
        token_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, token_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            transport,
            url: config.graphql_url()?,
            headers,
            timeout: config.timeout,
            throttler: None,
        })
    }

    /// Feed reported budget figures into a shared throttler
    pub fn with_throttler(mut self, throttler: Arc<Throttler>) -> Self {
        self.throttler = Some(throttler);
        self
    }

    /// Endpoint this service posts to
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post<D: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> DirectoryResult<D> {
        let request = GraphQlRequest::new(
            self.url.clone(),
            self.headers.clone(),
            operation,
            query,
            variables,
        )
        .with_timeout(self.timeout);

        let response = self.transport.post_graphql(request).await?;
        self.observe(&response);

        let data = response.into_data()?;
        serde_json::from_value(data).map_err(|e| DirectoryError::Response(e.into()))
    }

    fn observe(&self, response: &GraphQlResponse) {
        if let (Some(throttler), Some(status)) = (&self.throttler, response.throttle_status()) {
            throttler.observe(status);
        }
    }
}

#[async_trait]
impl CustomerDirectory for CustomersService {
    #[instrument(skip(self, request), fields(page = request.page_index(), filter = ?request.filter))]
    async fn list_page(&self, request: ListCustomersRequest) -> DirectoryResult<CustomerPage> {
        let data: ListCustomersData = self
            .post("ListCustomers", LIST_CUSTOMERS_QUERY, request.variables())
            .await?;
        let page = data.into_page(request.page_index())?;

        debug!(records = page.len(), last = page.is_last(), "Fetched customer page");
        Ok(page)
    }

    #[instrument(skip(self), fields(customer = %id))]
    async fn get_customer(&self, id: &CustomerId) -> DirectoryResult<CustomerRecord> {
        let data: GetCustomerData = self
            .post("GetCustomer", GET_CUSTOMER_QUERY, get_customer_variables(id))
            .await?;

        let raw = data
            .customer
            .ok_or_else(|| DirectoryError::customer_not_found(id.as_str()))?;
        Ok(raw.normalize()?)
    }

    #[instrument(skip(self, tags), fields(customer = %id, tags = tags.len()))]
    async fn update_tags(&self, id: &CustomerId, tags: &TagSet) -> DirectoryResult<()> {
        let data: UpdateTagsData = self
            .post(
                "UpdateCustomerTags",
                UPDATE_TAGS_MUTATION,
                update_tags_variables(id, tags),
            )
            .await?;

        let update = data.customer_update.ok_or(DirectoryError::Response(
            ResponseError::MissingField {
                field: "customerUpdate",
            },
        ))?;

        let Some(first) = update.user_errors.first() else {
            return Ok(());
        };

        let mentions_id = update.user_errors.iter().any(|e| {
            e.field
                .as_ref()
                .is_some_and(|path| path.iter().any(|segment| segment == "id"))
        });
        if mentions_id {
            return Err(DirectoryError::customer_not_found(id.as_str()));
        }

        Err(RequestError::Rejected {
            status: None,
            message: first.message.clone(),
        }
        .into())
    }
}

impl std::fmt::Debug for CustomersService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomersService")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockHttpTransport, MockResponse};
    use crate::resilience::ThrottleConfig;
    use serde_json::json;

    fn service(transport: Arc<MockHttpTransport>) -> CustomersService {
        let config = DirectoryConfig::builder()
            .access_token("shpat_test")
            .base_url("https://shop.example.com")
            .unwrap()
            .build()
            .unwrap();
        CustomersService::new(transport, &config).unwrap()
    }

    #[tokio::test]
    async fn test_list_page_sends_token_and_cursor() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.push(MockResponse::json(json!({
            "data": {
                "customers": {
                    "nodes": [{"id": "gid://customer/1", "tags": ["VIP"]}],
                    "pageInfo": {"hasNextPage": true, "endCursor": "c1"}
                },
                "customersCount": {"count": 7}
            }
        })));

        let page = service(transport.clone())
            .list_page(ListCustomersRequest::first_page(Some("tag:VIP".into()), 25))
            .await
            .unwrap();

        assert_eq!(page.next_cursor.as_deref(), Some("c1"));
        assert_eq!(page.expected_count, Some(7));

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].operation, "ListCustomers");
        assert_eq!(sent[0].headers[ACCESS_TOKEN_HEADER], "shpat_test");
        assert_eq!(sent[0].variables["first"], 25);
    }

    #[tokio::test]
    async fn test_missing_customer_is_not_found() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.push(MockResponse::json(json!({"data": {"customer": null}})));

        let err = service(transport)
            .get_customer(&CustomerId::new("gid://customer/9"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound { ref id, .. } if id == "gid://customer/9"));
    }

    #[tokio::test]
    async fn test_user_errors_are_rejections() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.push(MockResponse::json(json!({"data": {"customerUpdate": {
            "customer": null,
            "userErrors": [{"field": ["tags"], "message": "Tags are too long"}]
        }}})));

        let err = service(transport)
            .update_tags(&CustomerId::new("1"), &TagSet::parse("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Request(RequestError::Rejected { .. })));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_user_error_on_id_is_not_found() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.push(MockResponse::json(json!({"data": {"customerUpdate": {
            "customer": null,
            "userErrors": [{"field": ["id"], "message": "Customer does not exist"}]
        }}})));

        let err = service(transport)
            .update_tags(&CustomerId::new("404"), &TagSet::parse("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_budget_reaches_throttler() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.push(MockResponse::json(json!({
            "data": {"customer": {"id": "1", "tags": []}},
            "extensions": {"cost": {
                "requestedQueryCost": 2,
                "throttleStatus": {"maximumAvailable": 1000, "currentlyAvailable": 120, "restoreRate": 50}
            }}
        })));
        let throttler = Arc::new(Throttler::new(ThrottleConfig::default()));

        service(transport)
            .with_throttler(throttler.clone())
            .get_customer(&CustomerId::new("1"))
            .await
            .unwrap();

        assert!(throttler.available() < 130.0);
    }
}
