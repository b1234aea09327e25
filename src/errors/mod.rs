//! Error types for the directory client.
//!
//! Maps upstream failures (HTTP status codes, GraphQL error payloads,
//! transport faults) onto a semantic hierarchy that the retry policy can
//! classify without looking at raw responses.

use crate::resilience::FailureClass;
use crate::types::SyncResult;
use std::time::Duration;
use thiserror::Error;

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Root error type for the directory client
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Caller input rejected before any upstream call
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Request rejected by the upstream
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Explicit or implicit throttling
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Response parsing error
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// Unknown identifier
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of resource looked up
        resource: &'static str,
        /// Identifier that was not found
        id: String,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Rule is not active and was not executed
    #[error("Rule {id} is inactive")]
    RuleInactive {
        /// Rule identifier
        id: String,
    },

    /// Segment is known but has no filter mapping configured
    #[error("Segment '{segment}' has no configured filter")]
    UnresolvedSegment {
        /// Segment name
        segment: String,
    },

    /// A segment walk hit a fatal error after retrieving some records
    #[error("Sync of '{segment}' aborted after {retrieved} records: {source}")]
    WalkAborted {
        /// Segment name
        segment: String,
        /// Records retrieved before the failure
        retrieved: usize,
        /// Records accumulated before the failure
        partial: Box<SyncResult>,
        /// The error that ended the walk
        source: Box<DirectoryError>,
    },
}

impl DirectoryError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "DIRECTORY_CONFIG",
            Self::Validation(_) => "DIRECTORY_VALIDATION",
            Self::Request(_) => "DIRECTORY_REQUEST",
            Self::RateLimit(_) => "DIRECTORY_RATE_LIMIT",
            Self::Network(_) => "DIRECTORY_NETWORK",
            Self::Server(_) => "DIRECTORY_SERVER",
            Self::Response(_) => "DIRECTORY_RESPONSE",
            Self::NotFound { .. } => "DIRECTORY_NOT_FOUND",
            Self::Cancelled => "DIRECTORY_CANCELLED",
            Self::RuleInactive { .. } => "DIRECTORY_RULE_INACTIVE",
            Self::UnresolvedSegment { .. } => "DIRECTORY_UNRESOLVED_SEGMENT",
            Self::WalkAborted { .. } => "DIRECTORY_WALK_ABORTED",
        }
    }

    /// Classify this error for the retry policy
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Network(_) => FailureClass::Transient,
            Self::RateLimit(_) => FailureClass::Throttled,
            Self::Server(_) => FailureClass::Server,
            _ => FailureClass::Fatal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.failure_class() != FailureClass::Fatal
    }

    /// Get the upstream-suggested wait, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(RateLimitError::TooManyRequests { retry_after })
            | Self::RateLimit(RateLimitError::CostExceeded { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }

    /// Get HTTP status code if applicable
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RateLimit(_) => Some(429),
            Self::Server(ServerError::Status { status }) => Some(*status),
            Self::Server(ServerError::Unavailable) => Some(503),
            Self::Request(RequestError::Unauthorized { status }) => Some(*status),
            Self::Request(RequestError::Rejected { status, .. }) => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Shorthand for a missing customer
    pub fn customer_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "Customer",
            id: id.into(),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Missing access token
    #[error("Access token is missing")]
    MissingToken,

    /// Invalid base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },
}

/// Input validation errors, raised before any upstream call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tag is blank after trimming
    #[error("Tag must not be blank")]
    EmptyTag,

    /// Tag would be split by the upstream tag string format
    #[error("Tag '{tag}' must not contain a comma")]
    TagContainsComma {
        /// Offending tag
        tag: String,
    },

    /// No actions were supplied
    #[error("At least one tag action is required")]
    EmptyActions,

    /// Blank customer identifier
    #[error("Customer identifier must not be blank")]
    EmptyIdentifier,
}

/// Request errors reported by the upstream
#[derive(Error, Debug)]
pub enum RequestError {
    /// Credentials rejected
    #[error("Unauthorized (status {status})")]
    Unauthorized {
        /// HTTP status
        status: u16,
    },

    /// Request rejected and will not succeed on retry
    #[error("Rejected: {message}")]
    Rejected {
        /// HTTP status, when the rejection came from the status line
        status: Option<u16>,
        /// Error message
        message: String,
    },
}

/// Rate limit errors
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// HTTP 429
    #[error("Too many requests")]
    TooManyRequests {
        /// Value of the Retry-After header
        retry_after: Option<Duration>,
    },

    /// Query cost exceeded the available budget (reported in a 200 body)
    #[error("Query cost exceeded available budget")]
    CostExceeded {
        /// Cost the query asked for
        requested: Option<f64>,
        /// Points available when the query was rejected
        available: Option<f64>,
        /// Time until enough points are restored
        retry_after: Option<Duration>,
    },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection reset by peer
    #[error("Connection reset: {message}")]
    ConnectionReset {
        /// Error message
        message: String,
    },

    /// Connection failed
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message
        message: String,
    },

    /// Other HTTP-level failure
    #[error("HTTP error: {0}")]
    Http(String),
}

impl NetworkError {
    /// Whether this failure earns an immediate retry
    pub fn is_reset_or_timeout(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionReset { .. })
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_connect() {
            NetworkError::ConnectionFailed {
                message: err.to_string(),
            }
        } else if err.to_string().to_ascii_lowercase().contains("reset") {
            NetworkError::ConnectionReset {
                message: err.to_string(),
            }
        } else {
            NetworkError::Http(err.to_string())
        }
    }
}

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// 5xx status
    #[error("Upstream returned status {status}")]
    Status {
        /// HTTP status
        status: u16,
    },

    /// Service unavailable
    #[error("Service unavailable")]
    Unavailable,
}

/// Response parsing errors
#[derive(Error, Debug)]
pub enum ResponseError {
    /// JSON deserialization error
    #[error("Deserialization error: {message}")]
    Deserialization {
        /// Error message
        message: String,
    },

    /// GraphQL error that is not a throttling signal
    #[error("GraphQL error: {message}")]
    GraphQl {
        /// Joined error messages
        message: String,
    },

    /// Expected field missing from the payload
    #[error("Missing field '{field}' in response")]
    MissingField {
        /// Field path
        field: &'static str,
    },
}

impl From<serde_json::Error> for ResponseError {
    fn from(err: serde_json::Error) -> Self {
        ResponseError::Deserialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classes() {
        assert_eq!(
            DirectoryError::Network(NetworkError::Timeout).failure_class(),
            FailureClass::Transient
        );
        assert_eq!(
            DirectoryError::RateLimit(RateLimitError::TooManyRequests { retry_after: None })
                .failure_class(),
            FailureClass::Throttled
        );
        assert_eq!(
            DirectoryError::RateLimit(RateLimitError::CostExceeded {
                requested: Some(120.0),
                available: Some(20.0),
                retry_after: None,
            })
            .failure_class(),
            FailureClass::Throttled
        );
        assert_eq!(
            DirectoryError::Server(ServerError::Status { status: 502 }).failure_class(),
            FailureClass::Server
        );
        assert_eq!(
            DirectoryError::customer_not_found("gid://customer/1").failure_class(),
            FailureClass::Fatal
        );
        assert!(!DirectoryError::Validation(ValidationError::EmptyTag).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = DirectoryError::RateLimit(RateLimitError::TooManyRequests {
            retry_after: Some(Duration::from_secs(4)),
        });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(err.http_status(), Some(429));
        assert_eq!(DirectoryError::Network(NetworkError::Timeout).retry_after(), None);
    }

    #[test]
    fn test_not_found_display_names_identifier() {
        let err = DirectoryError::customer_not_found("gid://customer/42");
        assert_eq!(err.to_string(), "Customer not found: gid://customer/42");
        assert_eq!(err.error_code(), "DIRECTORY_NOT_FOUND");
    }
}
