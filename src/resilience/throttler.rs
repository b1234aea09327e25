//! Cost-budget throttler shared by every request to one upstream connection.
//!
//! The upstream meters work in cost points: a bucket of `maximum_available`
//! points refilled at `restore_rate` points per second. Page requests are
//! additionally spaced by a fixed interval so a full-size page never drains
//! the bucket faster than it restores.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Kind of upstream request, used to pick a cost estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// One page of a segment listing
    Page,
    /// Single customer read
    RecordRead,
    /// Single customer tag write
    RecordWrite,
}

/// Configuration for the throttler
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Bucket size in cost points
    pub maximum_available: f64,
    /// Points restored per second
    pub restore_rate: f64,
    /// Minimum delay between page requests
    pub page_interval: Duration,
    /// Estimated cost of a page request
    pub page_cost: f64,
    /// Estimated cost of a record read
    pub read_cost: f64,
    /// Estimated cost of a record write
    pub write_cost: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            maximum_available: 1000.0,
            restore_rate: 50.0,
            page_interval: Duration::from_millis(1200),
            page_cost: 52.0,
            read_cost: 2.0,
            write_cost: 10.0,
        }
    }
}

impl ThrottleConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bucket size
    pub fn maximum_available(mut self, points: f64) -> Self {
        self.maximum_available = points;
        self
    }

    /// Set restore rate (points per second)
    pub fn restore_rate(mut self, rate: f64) -> Self {
        self.restore_rate = rate;
        self
    }

    /// Set page spacing
    pub fn page_interval(mut self, interval: Duration) -> Self {
        self.page_interval = interval;
        self
    }

    /// Set the estimated page cost
    pub fn page_cost(mut self, cost: f64) -> Self {
        self.page_cost = cost;
        self
    }

    /// Disable spacing and make the budget effectively unlimited
    pub fn unlimited() -> Self {
        Self {
            maximum_available: f64::MAX / 4.0,
            restore_rate: f64::MAX / 4.0,
            page_interval: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Cost estimate for a request kind
    pub fn cost_of(&self, kind: RequestKind) -> f64 {
        let cost = match kind {
            RequestKind::Page => self.page_cost,
            RequestKind::RecordRead => self.read_cost,
            RequestKind::RecordWrite => self.write_cost,
        };
        cost.min(self.maximum_available)
    }
}

/// Budget figures reported by the upstream with each response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleStatus {
    /// Bucket size
    pub maximum_available: f64,
    /// Points currently available
    pub currently_available: f64,
    /// Points restored per second
    pub restore_rate: f64,
}

/// Outcome of [`Throttler::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Acquisition {
    /// Safe to send; `waited` is the time spent blocked
    Granted {
        /// Time spent waiting for budget
        waited: Duration,
    },
    /// Cancellation was signalled before permission was granted
    Cancelled,
}

struct Budget {
    available: f64,
    maximum: f64,
    restore_rate: f64,
    last_refill: Instant,
    last_page_at: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl Budget {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.restore_rate).min(self.maximum);
        self.last_refill = now;
    }

    fn wait_for(&self, kind: RequestKind, cost: f64, interval: Duration, now: Instant) -> Duration {
        let mut wait = Duration::ZERO;

        if let Some(until) = self.blocked_until {
            wait = wait.max(until.saturating_duration_since(now));
        }

        if kind == RequestKind::Page {
            if let Some(last) = self.last_page_at {
                wait = wait.max((last + interval).saturating_duration_since(now));
            }
        }

        if self.available < cost {
            let deficit = cost - self.available;
            let restore = Duration::try_from_secs_f64(deficit / self.restore_rate)
                .unwrap_or(Duration::MAX);
            wait = wait.max(restore);
        }

        wait
    }

    fn consume(&mut self, kind: RequestKind, cost: f64, now: Instant) {
        self.available -= cost;
        if kind == RequestKind::Page {
            self.last_page_at = Some(now);
        }
        if self.blocked_until.is_some_and(|until| until <= now) {
            self.blocked_until = None;
        }
    }
}

/// Slowest restore rate the bucket accepts, in points per second
const MIN_RESTORE_RATE: f64 = 0.001;

/// Rolling cost budget plus page spacing for one upstream connection.
///
/// Share one instance (behind an `Arc`) between the page walker and the bulk
/// mutator so pagination and mutation traffic draw from the same budget.
pub struct Throttler {
    budget: Mutex<Budget>,
    config: ThrottleConfig,
}

impl Throttler {
    /// Create a throttler with a full bucket
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            budget: Mutex::new(Budget {
                available: config.maximum_available,
                maximum: config.maximum_available,
                restore_rate: config.restore_rate.max(MIN_RESTORE_RATE),
                last_refill: Instant::now(),
                last_page_at: None,
                blocked_until: None,
            }),
            config,
        }
    }

    /// Wait until a request of `kind` may be sent.
    ///
    /// Never fails; returns [`Acquisition::Cancelled`] as soon as `cancel`
    /// fires instead of waiting further.
    pub async fn acquire(&self, kind: RequestKind, cancel: &CancellationToken) -> Acquisition {
        let cost = self.config.cost_of(kind);
        let mut waited = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Acquisition::Cancelled;
            }

            let wait = {
                let mut budget = self.budget.lock();
                let now = Instant::now();
                budget.refill(now);
                let wait = budget.wait_for(kind, cost, self.config.page_interval, now);
                if wait.is_zero() {
                    budget.consume(kind, cost, now);
                }
                wait
            };

            if wait.is_zero() {
                return Acquisition::Granted { waited };
            }

            debug!(?kind, wait_ms = wait.as_millis() as u64, "Waiting for throttle budget");

            tokio::select! {
                _ = cancel.cancelled() => return Acquisition::Cancelled,
                _ = tokio::time::sleep(wait) => waited += wait,
            }
        }
    }

    /// Hold every participant back for `duration`
    pub fn pause_for(&self, duration: Duration) {
        let mut budget = self.budget.lock();
        let until = Instant::now() + duration;
        if budget.blocked_until.map_or(true, |current| current < until) {
            budget.blocked_until = Some(until);
        }
    }

    /// Adopt budget figures reported by the upstream
    pub fn observe(&self, status: ThrottleStatus) {
        let mut budget = self.budget.lock();
        budget.refill(Instant::now());
        if status.maximum_available > 0.0 {
            budget.maximum = status.maximum_available;
        }
        if status.restore_rate > 0.0 {
            budget.restore_rate = status.restore_rate;
        }
        budget.available = status.currently_available.clamp(0.0, budget.maximum);

        debug!(
            available = budget.available,
            maximum = budget.maximum,
            restore_rate = budget.restore_rate,
            "Updated throttle budget from upstream"
        );
    }

    /// Points currently available
    pub fn available(&self) -> f64 {
        let mut budget = self.budget.lock();
        budget.refill(Instant::now());
        budget.available
    }

    /// The configuration in use
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler")
            .field("config", &self.config)
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(a: Acquisition) -> Duration {
        match a {
            Acquisition::Granted { waited } => waited,
            Acquisition::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_are_spaced() {
        let throttler = Throttler::new(ThrottleConfig::default());
        let cancel = CancellationToken::new();

        let start = Instant::now();
        assert_eq!(granted(throttler.acquire(RequestKind::Page, &cancel).await), Duration::ZERO);
        granted(throttler.acquire(RequestKind::Page, &cancel).await);
        granted(throttler.acquire(RequestKind::Page, &cancel).await);

        assert!(start.elapsed() >= Duration::from_millis(2400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_requests_are_not_spaced() {
        let throttler = Throttler::new(ThrottleConfig::default());
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..10 {
            granted(throttler.acquire(RequestKind::RecordRead, &cancel).await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_budget_restore() {
        let throttler = Throttler::new(
            ThrottleConfig::new()
                .maximum_available(100.0)
                .restore_rate(10.0)
                .page_interval(Duration::ZERO)
                .page_cost(60.0),
        );
        let cancel = CancellationToken::new();

        granted(throttler.acquire(RequestKind::Page, &cancel).await);
        // 40 left, 20 short: two seconds at 10 points per second
        let waited = granted(throttler.acquire(RequestKind::Page, &cancel).await);
        assert!(waited >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_early() {
        let throttler = Throttler::new(ThrottleConfig::default());
        let cancel = CancellationToken::new();

        granted(throttler.acquire(RequestKind::Page, &cancel).await);
        cancel.cancel();
        assert_eq!(
            throttler.acquire(RequestKind::Page, &cancel).await,
            Acquisition::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_all_kinds() {
        let throttler = Throttler::new(ThrottleConfig::default());
        let cancel = CancellationToken::new();

        throttler.pause_for(Duration::from_secs(3));
        let waited = granted(throttler.acquire(RequestKind::RecordWrite, &cancel).await);
        assert!(waited >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_restore_rate_waits_instead_of_panicking() {
        let throttler = Throttler::new(
            ThrottleConfig::new()
                .maximum_available(10.0)
                .restore_rate(0.0)
                .page_interval(Duration::ZERO),
        );
        let cancel = CancellationToken::new();

        granted(throttler.acquire(RequestKind::RecordWrite, &cancel).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        assert_eq!(
            throttler.acquire(RequestKind::RecordWrite, &cancel).await,
            Acquisition::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_adopts_upstream_budget() {
        let throttler = Throttler::new(ThrottleConfig::default());
        throttler.observe(ThrottleStatus {
            maximum_available: 2000.0,
            currently_available: 150.0,
            restore_rate: 100.0,
        });
        let available = throttler.available();
        assert!((150.0..160.0).contains(&available));
    }
}
