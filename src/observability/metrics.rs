//! Metrics collection for upstream traffic.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one upstream connection
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Request counters by endpoint
    request_counts: RwLock<HashMap<&'static str, AtomicU64>>,
    /// Failed attempt counters by endpoint
    error_counts: RwLock<HashMap<&'static str, AtomicU64>>,
    /// Retries granted by the retry policy
    retries: AtomicU64,
    /// Throttling responses seen (429 or cost exceeded)
    rate_limit_hits: AtomicU64,
    /// Acquisitions that had to wait for budget
    throttle_waits: AtomicU64,
    /// Total time spent waiting for budget, in milliseconds
    throttle_wait_ms: AtomicU64,
}

fn bump(map: &RwLock<HashMap<&'static str, AtomicU64>>, endpoint: &'static str) {
    if let Some(counter) = map.read().get(endpoint) {
        counter.fetch_add(1, Ordering::Relaxed);
        return;
    }
    map.write()
        .entry(endpoint)
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt against an endpoint
    pub fn record_request(&self, endpoint: &'static str, success: bool) {
        bump(&self.request_counts, endpoint);
        if !success {
            bump(&self.error_counts, endpoint);
        }
    }

    /// Record a retry
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a throttling response
    pub fn record_rate_limit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent blocked in the throttler
    pub fn record_throttle_wait(&self, waited: Duration) {
        self.throttle_waits.fetch_add(1, Ordering::Relaxed);
        self.throttle_wait_ms
            .fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
    }

    /// Attempts against an endpoint
    pub fn request_count(&self, endpoint: &str) -> u64 {
        self.request_counts
            .read()
            .get(endpoint)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Failed attempts against an endpoint
    pub fn error_count(&self, endpoint: &str) -> u64 {
        self.error_counts
            .read()
            .get(endpoint)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Retries granted
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Throttling responses seen
    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors = self.error_counts.read();
        let endpoints = self
            .request_counts
            .read()
            .iter()
            .map(|(endpoint, count)| {
                let failures = errors
                    .get(endpoint)
                    .map(|c| c.load(Ordering::Relaxed))
                    .unwrap_or(0);
                (
                    endpoint.to_string(),
                    EndpointMetrics {
                        requests: count.load(Ordering::Relaxed),
                        failures,
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            endpoints,
            retries: self.retries(),
            rate_limit_hits: self.rate_limit_hits(),
            throttle_waits: self.throttle_waits.load(Ordering::Relaxed),
            throttle_wait_ms: self.throttle_wait_ms.load(Ordering::Relaxed),
        }
    }
}

/// Per-endpoint counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointMetrics {
    /// Attempts
    pub requests: u64,
    /// Failed attempts
    pub failures: u64,
}

/// Point-in-time view of the collector
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Counters by endpoint
    pub endpoints: HashMap<String, EndpointMetrics>,
    /// Retries granted
    pub retries: u64,
    /// Throttling responses seen
    pub rate_limit_hits: u64,
    /// Acquisitions that waited
    pub throttle_waits: u64,
    /// Milliseconds spent waiting
    pub throttle_wait_ms: u64,
}
