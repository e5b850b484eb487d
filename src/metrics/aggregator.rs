//! Latency Metrics Aggregator
//!
//! Maps completed probes onto label-keyed Prometheus series. Gauges are
//! running sums: each probe *adds* its durations, so a consumer divides a
//! gauge by `<prefix>_total_requests` for the same edge to get a mean.

use std::collections::HashSet;

use parking_lot::Mutex;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use tracing::debug;

use crate::domain::ports::SourceIdentity;
use crate::error::{Error, Result};
use crate::probe::ProbeOutcome;

/// Default prefix of every exported series.
pub const DEFAULT_METRIC_PREFIX: &str = "scout";

/// Label names, in the order label values are supplied.
pub const EDGE_LABELS: [&str; 4] = ["src_node", "src_pod", "dest_node", "dest_pod"];

/// Accumulated values for one edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EdgeTotals {
    pub requests: u64,
    pub latency_ms: f64,
    pub dns_us: f64,
    pub conn_us: f64,
    pub server_processing_us: f64,
}

/// Label-keyed request counter and cumulative duration gauges.
pub struct LatencyMetrics {
    source: SourceIdentity,
    registry: Registry,
    total_requests: IntCounterVec,
    total_latency: GaugeVec,
    total_dns_duration: GaugeVec,
    total_conn_duration: GaugeVec,
    total_server_processing_duration: GaugeVec,
    // edges seen so far; the lock also serializes record() so one edge's
    // five series move together
    edges: Mutex<HashSet<EdgeKey>>,
}

impl LatencyMetrics {
    /// Create the series under `prefix` in a fresh registry.
    pub fn new(prefix: &str, source: SourceIdentity) -> Result<Self> {
        if prefix.is_empty() {
            return Err(Error::Config("metric prefix must not be empty".into()));
        }

        let registry = Registry::new();

        let total_requests = IntCounterVec::new(
            Opts::new(
                format!("{}_total_requests", prefix),
                "counts the number of requests",
            ),
            &EDGE_LABELS,
        )?;
        let total_latency = gauge(prefix, "total_latency", "gauge for total latency ms")?;
        let total_dns_duration = gauge(
            prefix,
            "total_dns_duration",
            "gauge for total dns duration us",
        )?;
        let total_conn_duration = gauge(
            prefix,
            "total_conn_duration",
            "gauge for total connection creation duration us",
        )?;
        let total_server_processing_duration = gauge(
            prefix,
            "total_server_processing_duration",
            "gauge for total server processing duration us",
        )?;

        registry.register(Box::new(total_requests.clone()))?;
        registry.register(Box::new(total_latency.clone()))?;
        registry.register(Box::new(total_dns_duration.clone()))?;
        registry.register(Box::new(total_conn_duration.clone()))?;
        registry.register(Box::new(total_server_processing_duration.clone()))?;

        Ok(Self {
            source,
            registry,
            total_requests,
            total_latency,
            total_dns_duration,
            total_conn_duration,
            total_server_processing_duration,
            edges: Mutex::new(HashSet::new()),
        })
    }

    pub fn source(&self) -> &SourceIdentity {
        &self.source
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Add one completed probe to its edge.
    ///
    /// Total latency is added in milliseconds, the other phases in
    /// microseconds; both truncated.
    pub fn record(&self, outcome: &ProbeOutcome) {
        let labels = [
            self.source.node.as_str(),
            self.source.instance.as_str(),
            outcome.endpoint.node.as_str(),
            outcome.endpoint.name.as_str(),
        ];
        let d = &outcome.durations;

        let mut edges = self.edges.lock();
        edges.insert(EdgeKey::new(&labels));
        self.total_requests.with_label_values(&labels[..]).inc();
        self.total_latency
            .with_label_values(&labels[..])
            .add(d.total_ms() as f64);
        self.total_dns_duration
            .with_label_values(&labels[..])
            .add(d.dns_us() as f64);
        self.total_conn_duration
            .with_label_values(&labels[..])
            .add(d.connect_us() as f64);
        self.total_server_processing_duration
            .with_label_values(&labels[..])
            .add(d.server_processing_us() as f64);

        debug!(
            dest_node = %outcome.endpoint.node,
            dest_pod = %outcome.endpoint.name,
            "Recorded probe"
        );
    }

    /// Current totals for the edge from this source to `dest_node/dest_pod`.
    /// Edges never observed read as zero.
    pub fn edge_totals(&self, dest_node: &str, dest_pod: &str) -> EdgeTotals {
        let labels = [
            self.source.node.as_str(),
            self.source.instance.as_str(),
            dest_node,
            dest_pod,
        ];

        let edges = self.edges.lock();
        if !edges.contains(&EdgeKey::new(&labels)) {
            return EdgeTotals::default();
        }

        EdgeTotals {
            requests: self.total_requests.with_label_values(&labels[..]).get(),
            latency_ms: self.total_latency.with_label_values(&labels[..]).get(),
            dns_us: self.total_dns_duration.with_label_values(&labels[..]).get(),
            conn_us: self.total_conn_duration.with_label_values(&labels[..]).get(),
            server_processing_us: self
                .total_server_processing_duration
                .with_label_values(&labels[..])
                .get(),
        }
    }

    /// Number of distinct edges observed.
    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }

    /// Encode all series in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for LatencyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyMetrics")
            .field("source", &self.source)
            .finish()
    }
}

fn gauge(prefix: &str, name: &str, help: &str) -> Result<GaugeVec> {
    Ok(GaugeVec::new(
        Opts::new(format!("{}_{}", prefix, name), help),
        &EDGE_LABELS,
    )?)
}

/// Owned label tuple identifying one edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey([String; 4]);

impl EdgeKey {
    fn new(labels: &[&str; 4]) -> Self {
        Self(labels.map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Endpoint;
    use crate::probe::DerivedDurations;
    use std::sync::Arc;
    use std::time::Duration;

    fn outcome(node: &str, pod: &str) -> ProbeOutcome {
        ProbeOutcome {
            endpoint: Endpoint::new(pod, "default", Some("10.0.0.5".into()), node),
            durations: DerivedDurations {
                dns: Duration::from_micros(120),
                connect: Duration::from_micros(450),
                server_processing: Duration::from_micros(2_300),
                content_transfer: Duration::from_micros(40),
                total: Duration::from_micros(3_900),
            },
            status: 200,
            body_bytes: 70,
        }
    }

    fn metrics() -> LatencyMetrics {
        LatencyMetrics::new("scout", SourceIdentity::new("src-node", "src-pod")).unwrap()
    }

    #[test]
    fn test_single_record() {
        let m = metrics();
        m.record(&outcome("n1", "p1"));

        let totals = m.edge_totals("n1", "p1");
        assert_eq!(totals.requests, 1);
        assert_eq!(totals.latency_ms, 3.0);
        assert_eq!(totals.dns_us, 120.0);
        assert_eq!(totals.conn_us, 450.0);
        assert_eq!(totals.server_processing_us, 2300.0);
    }

    #[test]
    fn test_records_accumulate_additively() {
        let m = metrics();
        let o = outcome("n1", "p1");
        m.record(&o);
        let once = m.edge_totals("n1", "p1");
        m.record(&o);
        let twice = m.edge_totals("n1", "p1");

        assert_eq!(twice.requests, 2);
        assert_eq!(twice.latency_ms, 2.0 * once.latency_ms);
        assert_eq!(twice.dns_us, 2.0 * once.dns_us);
        assert_eq!(twice.conn_us, 2.0 * once.conn_us);
        assert_eq!(twice.server_processing_us, 2.0 * once.server_processing_us);
    }

    #[test]
    fn test_edges_are_independent() {
        let m = metrics();
        m.record(&outcome("n1", "p1"));
        m.record(&outcome("n2", "p2"));
        m.record(&outcome("n2", "p2"));

        assert_eq!(m.edge_totals("n1", "p1").requests, 1);
        assert_eq!(m.edge_totals("n2", "p2").requests, 2);
        assert_eq!(m.edge_totals("n3", "p3"), EdgeTotals::default());
        assert_eq!(m.edge_count(), 2);
    }

    #[test]
    fn test_concurrent_records() {
        let m = Arc::new(metrics());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.record(&outcome("n1", "p1"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let totals = m.edge_totals("n1", "p1");
        assert_eq!(totals.requests, 800);
        assert_eq!(totals.dns_us, 800.0 * 120.0);
    }

    #[test]
    fn test_encode_text_format() {
        let m = metrics();
        m.record(&outcome("n1", "p1"));

        let (content_type, body) = m.encode().unwrap();
        let text = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("# TYPE scout_total_requests counter"));
        assert!(text.contains("# TYPE scout_total_latency gauge"));
        assert!(text.contains("scout_total_dns_duration"));
        assert!(text.contains("scout_total_conn_duration"));
        assert!(text.contains("scout_total_server_processing_duration"));
        assert!(text.contains(
            r#"scout_total_requests{dest_node="n1",dest_pod="p1",src_node="src-node",src_pod="src-pod"} 1"#
        ));
    }

    #[test]
    fn test_custom_prefix() {
        let m = LatencyMetrics::new("mesh", SourceIdentity::local()).unwrap();
        m.record(&outcome("n1", "p1"));
        let (_, body) = m.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("mesh_total_requests"));
        assert!(!text.contains("scout_"));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        assert!(LatencyMetrics::new("", SourceIdentity::local()).is_err());
    }
}
