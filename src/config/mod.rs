//! Configuration management for the directory client.
//!
//! Supports configuration via:
//! - Explicit values
//! - Environment variables
//! - Builder pattern

use crate::bulk::BulkConfig;
use crate::errors::{ConfigurationError, DirectoryError, DirectoryResult};
use crate::resilience::{RetryConfig, ThrottleConfig};
use crate::sync::{default_segments, SegmentDefinition, WalkConfig};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

/// Environment variable prefix for segment filter overrides
pub const SEGMENT_ENV_PREFIX: &str = "DIRECTORY_SEGMENT_";

/// Configuration for the directory client
#[derive(Clone)]
pub struct DirectoryConfig {
    /// Access token sent with every request
    pub(crate) access_token: Option<SecretString>,
    /// Upstream base URL
    pub base_url: Option<Url>,
    /// Upstream API version path segment
    pub api_version: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Cost budget and request spacing
    pub throttle: ThrottleConfig,
    /// Retry and backoff
    pub retry: RetryConfig,
    /// Pagination
    pub walk: WalkConfig,
    /// Bulk mutation
    pub bulk: BulkConfig,
    /// Lifetime of cached segment syncs
    pub cache_ttl: Duration,
    /// Known segments and their filters
    pub segments: Vec<SegmentDefinition>,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("throttle", &self.throttle)
            .field("retry", &self.retry)
            .field("walk", &self.walk)
            .field("bulk", &self.bulk)
            .field("cache_ttl", &self.cache_ttl)
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: None,
            api_version: crate::DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS),
            throttle: ThrottleConfig::default(),
            retry: RetryConfig::default(),
            walk: WalkConfig::default(),
            bulk: BulkConfig::default(),
            cache_ttl: Duration::from_secs(crate::DEFAULT_CACHE_TTL_SECS),
            segments: default_segments(),
        }
    }
}

impl DirectoryConfig {
    /// Create a new configuration builder
    pub fn builder() -> DirectoryConfigBuilder {
        DirectoryConfigBuilder::new()
    }

    /// Create configuration from environment variables
    pub fn from_env() -> DirectoryResult<Self> {
        let mut builder = DirectoryConfigBuilder::new();

        if let Ok(token) = std::env::var("DIRECTORY_ACCESS_TOKEN") {
            builder = builder.access_token(&token);
        }

        if let Ok(url) = std::env::var("DIRECTORY_BASE_URL") {
            builder = builder.base_url(&url)?;
        }

        if let Ok(version) = std::env::var("DIRECTORY_API_VERSION") {
            builder = builder.api_version(&version);
        }

        if let Some(secs) = env_parse::<u64>("DIRECTORY_TIMEOUT") {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(size) = env_parse::<u32>("DIRECTORY_PAGE_SIZE") {
            builder = builder.page_size(size);
        }

        if let Some(pages) = env_parse::<u32>("DIRECTORY_MAX_PAGES") {
            builder = builder.max_pages(pages);
        }

        if let Some(n) = env_parse::<usize>("DIRECTORY_CONCURRENCY") {
            builder = builder.concurrency(n);
        }

        if let Some(secs) = env_parse::<u64>("DIRECTORY_CACHE_TTL") {
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }

        for (key, value) in std::env::vars() {
            if let Some(suffix) = key.strip_prefix(SEGMENT_ENV_PREFIX) {
                builder = builder.segment_filter(&segment_name_from_env(suffix), &value);
            }
        }

        builder.build()
    }

    /// Access token, exposed for request headers
    pub(crate) fn access_token(&self) -> Option<&str> {
        self.access_token.as_ref().map(|t| t.expose_secret().as_str())
    }

    /// Full URL of the GraphQL endpoint
    pub fn graphql_url(&self) -> Result<String, ConfigurationError> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| ConfigurationError::InvalidUrl("base URL is not set".to_string()))?;
        Ok(format!(
            "{}/api/{}/graphql.json",
            base.as_str().trim_end_matches('/'),
            self.api_version
        ))
    }

    /// Validate the configuration
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.access_token.is_none() {
            return Err(DirectoryError::Configuration(ConfigurationError::MissingToken));
        }
        self.graphql_url()?;
        self.validate_limits()
    }

    /// Validate only the numeric limits (used when no HTTP transport is built)
    pub fn validate_limits(&self) -> DirectoryResult<()> {
        if self.walk.page_size == 0 || self.walk.preview_size == 0 {
            return Err(invalid("page size must be positive"));
        }
        if self.walk.max_pages == 0 {
            return Err(invalid("page ceiling must be positive"));
        }
        if !(1..=crate::bulk::MAX_CONCURRENCY).contains(&self.bulk.concurrency) {
            return Err(invalid(&format!(
                "bulk concurrency must be between 1 and {}",
                crate::bulk::MAX_CONCURRENCY
            )));
        }
        if self.throttle.restore_rate <= 0.0 || self.throttle.maximum_available <= 0.0 {
            return Err(invalid("throttle budget must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> DirectoryError {
    DirectoryError::Configuration(ConfigurationError::InvalidConfiguration {
        message: message.to_string(),
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// `REPEAT_BUYERS` -> `Repeat Buyers`
fn segment_name_from_env(suffix: &str) -> String {
    suffix
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let lower = w.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builder for DirectoryConfig
#[derive(Default)]
pub struct DirectoryConfigBuilder {
    config: DirectoryConfig,
}

impl DirectoryConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: DirectoryConfig::default(),
        }
    }

    /// Set the access token
    pub fn access_token(mut self, token: &str) -> Self {
        self.config.access_token = Some(SecretString::new(token.to_string()));
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: &str) -> Result<Self, ConfigurationError> {
        self.config.base_url =
            Some(Url::parse(url).map_err(|e| ConfigurationError::InvalidUrl(e.to_string()))?);
        Ok(self)
    }

    /// Set the API version
    pub fn api_version(mut self, version: &str) -> Self {
        self.config.api_version = version.to_string();
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the throttle configuration
    pub fn throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.config.throttle = throttle;
        self
    }

    /// Set the retry configuration
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set records per page
    pub fn page_size(mut self, size: u32) -> Self {
        self.config.walk.page_size = size;
        self
    }

    /// Set the safety page ceiling
    pub fn max_pages(mut self, pages: u32) -> Self {
        self.config.walk.max_pages = pages;
        self
    }

    /// Set concurrent identifier updates
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.bulk.concurrency = n;
        self
    }

    /// Set the sync cache lifetime
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set or override the filter for a segment
    pub fn segment_filter(mut self, name: &str, filter: &str) -> Self {
        match self
            .config
            .segments
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(segment) => segment.filter = Some(filter.to_string()),
            None => self
                .config
                .segments
                .push(SegmentDefinition::new(name, Some(filter.to_string()), "")),
        }
        self
    }

    /// Replace the segment table
    pub fn segments(mut self, segments: Vec<SegmentDefinition>) -> Self {
        self.config.segments = segments;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DirectoryResult<DirectoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation (for testing)
    pub fn build_unchecked(self) -> DirectoryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DirectoryConfigBuilder::new()
            .access_token("tok_123")
            .base_url("https://shop.example.com")
            .unwrap()
            .timeout(Duration::from_secs(10))
            .page_size(25)
            .concurrency(6)
            .build()
            .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.walk.page_size, 25);
        assert_eq!(config.bulk.concurrency, 6);
        assert_eq!(config.access_token(), Some("tok_123"));
    }

    #[test]
    fn test_graphql_url() {
        let config = DirectoryConfigBuilder::new()
            .access_token("tok")
            .base_url("https://shop.example.com/")
            .unwrap()
            .api_version("2024-01")
            .build()
            .unwrap();

        assert_eq!(
            config.graphql_url().unwrap(),
            "https://shop.example.com/api/2024-01/graphql.json"
        );
    }

    #[test]
    fn test_validation_missing_token() {
        let result = DirectoryConfigBuilder::new()
            .base_url("https://shop.example.com")
            .unwrap()
            .build();
        assert!(matches!(
            result,
            Err(DirectoryError::Configuration(ConfigurationError::MissingToken))
        ));
    }

    #[test]
    fn test_validation_concurrency_bounds() {
        let config = DirectoryConfigBuilder::new().concurrency(0).build_unchecked();
        assert!(config.validate_limits().is_err());

        let config = DirectoryConfigBuilder::new().concurrency(9).build_unchecked();
        assert!(config.validate_limits().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = DirectoryConfigBuilder::new()
            .access_token("super-secret")
            .build_unchecked();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_segment_filter_override() {
        let config = DirectoryConfigBuilder::new()
            .segment_filter("repeat buyers", "orders_count:>1")
            .segment_filter("Dormant", "last_order_date:<-180d")
            .build_unchecked();

        let repeat = config
            .segments
            .iter()
            .find(|s| s.name == "Repeat Buyers")
            .unwrap();
        assert_eq!(repeat.filter.as_deref(), Some("orders_count:>1"));
        assert!(config.segments.iter().any(|s| s.name == "Dormant"));
    }

    #[test]
    fn test_segment_name_from_env() {
        assert_eq!(segment_name_from_env("REPEAT_BUYERS"), "Repeat Buyers");
        assert_eq!(segment_name_from_env("VIP"), "Vip");
    }
}
