//! Scout - pod-to-pod latency prober
//!
//! Continuously probes every peer instance of a workload, breaks each
//! round-trip into phases (DNS, connect, server processing, content
//! transfer) and exports cumulative per-edge totals for Prometheus.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Discovery   │──▶│  Probe Loop  │──▶│    Prober    │──▶│   Metrics    │
//! │ (Kubernetes) │   │   (waves)    │   │ (phase trace)│   │ (aggregator) │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 │ scrape
//!                                                          ┌──────▼───────┐
//!                                                          │    Server    │
//!                                                          └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Discovery adapters implementing domain ports
//! - [`config`] - CLI/env arguments and logging setup
//! - [`controller`] - The probe loop
//! - [`domain`] - Endpoint identity, operating mode and ports
//! - [`error`] - Error types
//! - [`metrics`] - Label-keyed latency series
//! - [`probe`] - Instrumented probe execution and phase timing
//! - [`server`] - Metrics exposition and liveness endpoint

pub mod adapters;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod server;

// Re-export commonly used types
pub use controller::{ProbeLoop, ProbeLoopConfig, WaveSummary};
pub use domain::{Endpoint, EndpointDiscovery, OperatingMode, SourceIdentity};
pub use error::{Error, Result};
pub use metrics::LatencyMetrics;
pub use probe::{DerivedDurations, ProbeConfig, ProbeOutcome, Prober};
