//! Observability infrastructure for the directory client.
//!
//! Logging goes through `tracing`; this module holds the counters.

pub mod metrics;

pub use metrics::*;
