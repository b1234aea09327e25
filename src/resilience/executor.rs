//! Request executor combining throttling and retry.

use super::{Acquisition, FailureClass, RequestKind, RetryDecision, RetryPolicy, Throttler};
use crate::errors::{DirectoryError, DirectoryResult};
use crate::observability::MetricsCollector;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs one upstream call at a time through the shared throttler and the
/// retry policy.
pub struct RequestExecutor {
    throttler: Arc<Throttler>,
    policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl RequestExecutor {
    /// Create an executor
    pub fn new(
        throttler: Arc<Throttler>,
        policy: RetryPolicy,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            throttler,
            policy,
            metrics,
        }
    }

    /// The shared throttler
    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    /// The metrics sink
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Execute `operation` with throttling and retries.
    ///
    /// Every attempt, including retries, first acquires throttle permission.
    /// Throttling errors pause the shared throttler so concurrent callers
    /// back off together; other retryable errors sleep locally. Cancellation
    /// stops before the next attempt and yields [`DirectoryError::Cancelled`].
    pub async fn execute<F, Fut, T>(
        &self,
        endpoint: &'static str,
        kind: RequestKind,
        cancel: &CancellationToken,
        operation: F,
    ) -> DirectoryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let mut state = self.policy.start();

        loop {
            match self.throttler.acquire(kind, cancel).await {
                Acquisition::Cancelled => return Err(DirectoryError::Cancelled),
                Acquisition::Granted { waited } if !waited.is_zero() => {
                    self.metrics.record_throttle_wait(waited)
                }
                Acquisition::Granted { .. } => {}
            }

            let result = operation().await;
            self.metrics.record_request(endpoint, result.is_ok());

            let error = match result {
                Ok(value) => {
                    if state.retries > 0 {
                        debug!(endpoint, attempt = state.retries + 1, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = error.failure_class();
            if class == FailureClass::Throttled {
                self.metrics.record_rate_limit();
            }

            let delay = match self.policy.decide(&mut state, &error) {
                RetryDecision::GiveUp => {
                    warn!(
                        endpoint,
                        attempts = state.retries + 1,
                        retryable = error.is_retryable(),
                        error = %error,
                        "Request failed permanently"
                    );
                    return Err(error);
                }
                RetryDecision::RetryAfter(delay) => delay,
            };

            self.metrics.record_retry();
            debug!(
                endpoint,
                attempt = state.retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );

            if class == FailureClass::Throttled {
                self.throttler.pause_for(delay);
            } else if !delay.is_zero() && !sleep_or_cancel(delay, cancel).await {
                return Err(DirectoryError::Cancelled);
            }
        }
    }
}

/// Returns false when cancelled before the delay elapsed
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("policy", &self.policy)
            .field("throttler", &self.throttler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{NetworkError, RateLimitError};
    use crate::resilience::{RetryConfig, ThrottleConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn executor(config: RetryConfig) -> RequestExecutor {
        RequestExecutor::new(
            Arc::new(Throttler::new(ThrottleConfig::unlimited())),
            RetryPolicy::new(config),
            Arc::new(MetricsCollector::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let exec = executor(RetryConfig::default());
        let cancel = CancellationToken::new();

        let result = exec
            .execute("test", RequestKind::RecordRead, &cancel, || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(DirectoryError::Network(NetworkError::Timeout))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(exec.metrics().retries(), 2);
        assert_eq!(exec.metrics().error_count("test"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let exec = executor(RetryConfig::new().max_retries(2));
        let cancel = CancellationToken::new();

        let result: DirectoryResult<()> = exec
            .execute("test", RequestKind::RecordRead, &cancel, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(DirectoryError::RateLimit(RateLimitError::TooManyRequests {
                        retry_after: None,
                    }))
                }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::RateLimit(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(exec.metrics().rate_limit_hits(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let exec = executor(RetryConfig::default());
        let cancel = CancellationToken::new();

        let result: DirectoryResult<()> = exec
            .execute("test", RequestKind::RecordRead, &cancel, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(DirectoryError::customer_not_found("7"))
                }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_retry_waits_backoff() {
        let attempts = Arc::new(AtomicU32::new(0));
        let exec = executor(RetryConfig::default());
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result = exec
            .execute("test", RequestKind::Page, &cancel, || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(DirectoryError::RateLimit(RateLimitError::TooManyRequests {
                            retry_after: None,
                        }))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let exec = executor(RetryConfig::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: DirectoryResult<()> = exec
            .execute("test", RequestKind::RecordRead, &cancel, || {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Err(DirectoryError::Server(crate::errors::ServerError::Unavailable))
                }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::Cancelled)));
    }
}
