//! HTTP transport layer for the directory client.
//!
//! Posts GraphQL documents to the upstream and turns every failure signal
//! it can carry (status line, Retry-After header, GraphQL `errors` array in
//! a 200 body) into a typed [`DirectoryError`].

use crate::errors::{
    DirectoryError, DirectoryResult, NetworkError, RateLimitError, RequestError, ResponseError,
    ServerError,
};
use crate::resilience::ThrottleStatus;
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Error code the upstream uses for cost-exceeded responses
pub const THROTTLED_CODE: &str = "THROTTLED";

/// HTTP transport trait for making API requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Post a GraphQL document and return its classified response
    async fn post_graphql(&self, request: GraphQlRequest) -> DirectoryResult<GraphQlResponse>;
}

/// GraphQL request
#[derive(Debug, Clone)]
pub struct GraphQlRequest {
    /// Endpoint URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Operation name, used for logging
    pub operation: &'static str,
    /// GraphQL document
    pub query: &'static str,
    /// Variables
    pub variables: Value,
    /// Request timeout
    pub timeout: Option<Duration>,
}

#[derive(Serialize)]
struct GraphQlBody<'a> {
    query: &'a str,
    variables: &'a Value,
}

impl GraphQlRequest {
    /// Create a new request
    pub fn new(
        url: impl Into<String>,
        headers: HeaderMap,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Self {
        Self {
            url: url.into(),
            headers,
            operation,
            query,
            variables,
            timeout: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful GraphQL response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlResponse {
    /// `data` member
    #[serde(default)]
    pub data: Option<Value>,
    /// `extensions` member
    #[serde(default)]
    pub extensions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<RawGraphQlError>,
    #[serde(default)]
    extensions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawGraphQlError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<RawErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct RawErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCost {
    #[serde(default)]
    requested_query_cost: Option<f64>,
    throttle_status: RawThrottleStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThrottleStatus {
    maximum_available: f64,
    currently_available: f64,
    restore_rate: f64,
}

fn parse_cost(extensions: Option<&Value>) -> Option<RawCost> {
    extensions
        .and_then(|ext| ext.get("cost"))
        .and_then(|cost| serde_json::from_value(cost.clone()).ok())
}

impl GraphQlResponse {
    /// Budget figures reported in `extensions.cost.throttleStatus`
    pub fn throttle_status(&self) -> Option<ThrottleStatus> {
        parse_cost(self.extensions.as_ref()).map(|cost| ThrottleStatus {
            maximum_available: cost.throttle_status.maximum_available,
            currently_available: cost.throttle_status.currently_available,
            restore_rate: cost.throttle_status.restore_rate,
        })
    }

    /// Take the `data` member, failing if absent
    pub fn into_data(self) -> DirectoryResult<Value> {
        self.data
            .ok_or(DirectoryError::Response(ResponseError::MissingField { field: "data" }))
    }
}

/// Classify a raw upstream reply.
///
/// Shared by the real transport and the mock so both detect throttling the
/// same way.
pub fn classify_response(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> DirectoryResult<GraphQlResponse> {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if code == StatusCode::TOO_MANY_REQUESTS {
        return Err(RateLimitError::TooManyRequests { retry_after }.into());
    }
    if code.is_server_error() {
        return Err(if code == StatusCode::SERVICE_UNAVAILABLE {
            ServerError::Unavailable.into()
        } else {
            ServerError::Status { status }.into()
        });
    }
    if code == StatusCode::NOT_FOUND {
        return Err(DirectoryError::NotFound {
            resource: "Endpoint",
            id: String::new(),
        });
    }
    if code == StatusCode::UNAUTHORIZED || code == StatusCode::FORBIDDEN {
        return Err(RequestError::Unauthorized { status }.into());
    }
    if code.is_client_error() {
        return Err(RequestError::Rejected {
            status: Some(status),
            message: body.chars().take(200).collect(),
        }
        .into());
    }

    let envelope: RawEnvelope =
        serde_json::from_str(body).map_err(|e| DirectoryError::Response(e.into()))?;

    if envelope.errors.is_empty() {
        return Ok(GraphQlResponse {
            data: envelope.data,
            extensions: envelope.extensions,
        });
    }

    let throttled = envelope.errors.iter().any(|e| {
        e.extensions
            .as_ref()
            .and_then(|x| x.code.as_deref())
            .is_some_and(|c| c == THROTTLED_CODE)
    });

    if throttled {
        let cost = parse_cost(envelope.extensions.as_ref());
        let requested = cost.as_ref().and_then(|c| c.requested_query_cost);
        let available = cost.as_ref().map(|c| c.throttle_status.currently_available);
        let retry_after = cost.as_ref().and_then(|c| {
            let deficit = c.requested_query_cost? - c.throttle_status.currently_available;
            (deficit > 0.0 && c.throttle_status.restore_rate > 0.0)
                .then(|| Duration::from_secs_f64(deficit / c.throttle_status.restore_rate))
        });
        return Err(RateLimitError::CostExceeded {
            requested,
            available,
            retry_after,
        }
        .into());
    }

    let message = envelope
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(ResponseError::GraphQl { message }.into())
}

/// Default HTTP transport implementation using reqwest
pub struct ReqwestTransport {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    /// Create a new transport with the given timeout
    pub fn new(timeout: Duration) -> DirectoryResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| DirectoryError::Network(NetworkError::Http(e.to_string())))?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Create a new transport with a pre-built client
    pub fn with_client(client: Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(operation = request.operation, url = %request.url))]
    async fn post_graphql(&self, request: GraphQlRequest) -> DirectoryResult<GraphQlResponse> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let body = GraphQlBody {
            query: request.query,
            variables: &request.variables,
        };

        let response = self
            .client
            .post(&request.url)
            .headers(request.headers)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DirectoryError::Network(NetworkError::from(e)))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| *secs >= 0.0)
            .map(Duration::from_secs_f64);

        let text = response
            .text()
            .await
            .map_err(|e| DirectoryError::Network(NetworkError::from(e)))?;

        debug!(status, bytes = text.len(), "Received response");

        classify_response(status, retry_after, &text)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_429_is_rate_limited() {
        let err = classify_response(429, Some(Duration::from_secs(2)), "").unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::RateLimit(RateLimitError::TooManyRequests { retry_after: Some(d) })
                if d == Duration::from_secs(2)
        ));
    }

    #[test]
    fn test_throttled_body_is_rate_limited() {
        let body = json!({
            "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}],
            "extensions": {"cost": {
                "requestedQueryCost": 102,
                "throttleStatus": {"maximumAvailable": 1000, "currentlyAvailable": 2, "restoreRate": 50}
            }}
        })
        .to_string();

        let err = classify_response(200, None, &body).unwrap_err();
        assert_eq!(err.failure_class(), crate::resilience::FailureClass::Throttled);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_other_graphql_errors_are_fatal() {
        let body = json!({"errors": [{"message": "Field 'bogus' doesn't exist"}]}).to_string();
        let err = classify_response(200, None, &body).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_status_classes() {
        assert!(classify_response(502, None, "").unwrap_err().is_retryable());
        assert!(matches!(
            classify_response(503, None, "").unwrap_err(),
            DirectoryError::Server(ServerError::Unavailable)
        ));
        assert!(!classify_response(401, None, "").unwrap_err().is_retryable());
        assert!(!classify_response(422, None, "bad").unwrap_err().is_retryable());
    }

    #[test]
    fn test_throttle_status_extracted() {
        let body = json!({
            "data": {"ok": true},
            "extensions": {"cost": {
                "requestedQueryCost": 12,
                "throttleStatus": {"maximumAvailable": 2000, "currentlyAvailable": 1500, "restoreRate": 100}
            }}
        })
        .to_string();

        let response = classify_response(200, None, &body).unwrap();
        let status = response.throttle_status().unwrap();
        assert_eq!(status.currently_available, 1500.0);
        assert_eq!(status.restore_rate, 100.0);
    }
}
