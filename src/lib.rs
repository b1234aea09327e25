//! Customer Directory Sync Client
//!
//! Rate-limited client for a cost-metered, cursor-paginated customer
//! directory API:
//! - Segment sync: walks a segment's listing to completion with a safety
//!   page ceiling, deduplicates records and caches the result
//! - Bulk tag mutation with bounded concurrency and per-record fault isolation
//! - Tagging rules that sync a trigger segment and tag its members
//! - One shared cost-budget throttler per upstream connection, plus retry
//!   with backoff for throttling, server and network failures
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use directory_sync::types::TagAction;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = directory_sync::create_client_from_env()?;
//!
//!     let sync = client.sync_segment("VIP", false, None).await?;
//!     println!("{} of {:?} customers", sync.actual_count, sync.expected_count);
//!
//!     let outcome = client
//!         .apply_tags(&sync.identifiers(), &[TagAction::add("Gold")?])
//!         .await?;
//!     println!("{} tagged, {} failed", outcome.succeeded, outcome.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Core modules
pub mod client;
pub mod config;
pub mod errors;
pub mod transport;
pub mod types;

// Services
pub mod services;

// Sync, mutation and rules
pub mod bulk;
pub mod rules;
pub mod store;
pub mod sync;

// Resilience
pub mod resilience;

// Observability
pub mod observability;

// Testing utilities
pub mod fixtures;
pub mod mocks;

// Tests
#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use client::DirectoryClient;
pub use config::{DirectoryConfig, DirectoryConfigBuilder};
pub use errors::{DirectoryError, DirectoryResult};

/// Default upstream API version
pub const DEFAULT_API_VERSION: &str = "2024-01";

/// Default timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default lifetime of a cached segment sync, in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Create a directory client with the given configuration
pub fn create_client(config: DirectoryConfig) -> DirectoryResult<DirectoryClient> {
    DirectoryClient::new(config)
}

/// Create a directory client from environment variables
///
/// Reads:
/// - `DIRECTORY_ACCESS_TOKEN` - API access token
/// - `DIRECTORY_BASE_URL` - Shop base URL
/// - `DIRECTORY_API_VERSION` - API version (default `2024-01`)
/// - `DIRECTORY_TIMEOUT` - Per-request timeout in seconds
/// - `DIRECTORY_PAGE_SIZE`, `DIRECTORY_MAX_PAGES` - Pagination limits
/// - `DIRECTORY_CONCURRENCY` - Concurrent identifier updates (1-8)
/// - `DIRECTORY_CACHE_TTL` - Sync cache lifetime in seconds
/// - `DIRECTORY_SEGMENT_<NAME>` - Filter for a segment, e.g.
///   `DIRECTORY_SEGMENT_REPEAT_BUYERS`
pub fn create_client_from_env() -> DirectoryResult<DirectoryClient> {
    let config = DirectoryConfig::from_env()?;
    create_client(config)
}
