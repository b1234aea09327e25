//! Retry classification and backoff.
//!
//! The policy is a pure state machine: [`RetryPolicy::decide`] looks at a
//! failure and the per-request [`RetryState`] and returns how long to wait,
//! without sleeping itself. Sleeping belongs to the executor.

use crate::errors::DirectoryError;
use std::time::Duration;

/// Coarse classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Timeout, connection reset or other transport fault
    Transient,
    /// HTTP 429 or cost-exceeded body
    Throttled,
    /// Upstream 5xx
    Server,
    /// Will never succeed (not found, bad input, auth)
    Fatal,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first backoff retry
    pub initial_backoff: Duration,
    /// Maximum delay between retries
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set initial backoff
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set maximum backoff
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set backoff multiplier
    pub fn multiplier(mut self, m: f64) -> Self {
        self.multiplier = m;
        self
    }

    /// Delay for the n-th backoff step (1-based)
    pub fn delay_for_step(&self, step: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64()
            * self.multiplier.powi(step.saturating_sub(1) as i32);
        Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()))
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay (zero means immediately)
    RetryAfter(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Per-request retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retries granted so far
    pub retries: u32,
    /// Backoff steps taken so far
    pub backoff_steps: u32,
    /// Whether the one immediate retry for resets/timeouts was used
    pub immediate_used: bool,
    /// Delay of the most recent retry decision
    pub last_delay: Option<Duration>,
}

/// Decides whether and when a failed request is retried
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Fresh state for a new request
    pub fn start(&self) -> RetryState {
        RetryState::default()
    }

    /// The configuration in use
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Classify `error` and advance `state`.
    ///
    /// Fatal errors give up at once. A reset or timeout gets one immediate
    /// retry, then joins throttling and server errors on exponential backoff.
    /// An upstream Retry-After longer than the computed backoff wins.
    pub fn decide(&self, state: &mut RetryState, error: &DirectoryError) -> RetryDecision {
        let class = error.failure_class();
        if class == FailureClass::Fatal || state.retries >= self.config.max_retries {
            return RetryDecision::GiveUp;
        }

        state.retries += 1;

        let immediate = matches!(error, DirectoryError::Network(n) if n.is_reset_or_timeout());
        let delay = if immediate && !state.immediate_used {
            state.immediate_used = true;
            Duration::ZERO
        } else {
            state.backoff_steps += 1;
            let backoff = self.config.delay_for_step(state.backoff_steps);
            match error.retry_after() {
                Some(hint) if hint > backoff => hint,
                _ => backoff,
            }
        };

        state.last_delay = Some(delay);
        RetryDecision::RetryAfter(delay)
    }
}
