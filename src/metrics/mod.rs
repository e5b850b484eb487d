//! Metrics module
//!
//! Label-keyed latency series exported for Prometheus to scrape.

mod aggregator;

pub use aggregator::{EdgeTotals, LatencyMetrics, DEFAULT_METRIC_PREFIX, EDGE_LABELS};
