//! Resilience patterns for the directory client.
//!
//! Provides the shared cost-budget throttler, the retry policy, and the
//! executor that runs upstream calls through both.

pub mod executor;
pub mod retry;
pub mod throttler;

pub use executor::RequestExecutor;
pub use retry::{FailureClass, RetryConfig, RetryDecision, RetryPolicy, RetryState};
pub use throttler::{Acquisition, RequestKind, ThrottleConfig, ThrottleStatus, Throttler};
