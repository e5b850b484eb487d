//! Probe Executor
//!
//! Issues one instrumented `GET /` to one endpoint over a brand-new
//! connection and returns the phase durations of that exchange.
//!
//! Every probe dials its own TCP connection, performs a dedicated HTTP/1.1
//! handshake on it and sends `Connection: close`, so no connection is ever
//! reused and every probe pays (and measures) its own connect phase.
//!
//! The DNS phase is traced but never reported: in-cluster targets are IP
//! literals, and out of the cluster the only name resolved is the fixed
//! local host, which says nothing about the target.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::{CONNECTION, HOST, USER_AGENT};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::durations::DerivedDurations;
use super::io::TracedStream;
use super::trace::{TraceEvent, TraceRecorder};
use crate::domain::ports::{Endpoint, OperatingMode};
use crate::error::{Error, Result};

/// Port every scout instance listens on.
pub const DEFAULT_PORT: u16 = 8080;

/// Host dialed in out-of-cluster mode.
pub const DEFAULT_LOCAL_HOST: &str = "127.0.0.1";

/// Upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const PROBE_USER_AGENT: &str = concat!("scout/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the probe executor
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Port dialed on every target
    pub port: u16,

    /// Host dialed when running outside the cluster
    pub local_host: String,

    /// Bound on one probe, connect through body read
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            local_host: DEFAULT_LOCAL_HOST.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of one successful probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// The endpoint that was probed
    pub endpoint: Endpoint,

    /// Phase durations of the exchange
    pub durations: DerivedDurations,

    /// HTTP status returned by the target (not interpreted)
    pub status: u16,

    /// Size of the discarded response body
    pub body_bytes: usize,
}

// =============================================================================
// Connector
// =============================================================================

/// Establishes the raw TCP connection for a probe, reporting DNS and
/// connect events to the recorder.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16, recorder: &TraceRecorder) -> Result<TcpStream>;
}

/// Plain TCP connector using the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16, recorder: &TraceRecorder) -> Result<TcpStream> {
        // IP literals never hit the resolver, so no DNS events fire for them
        let addrs: Vec<SocketAddr> = match host.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => {
                recorder.record(TraceEvent::DnsStart);
                let resolved = tokio::net::lookup_host((host, port)).await;
                recorder.record(TraceEvent::DnsDone);
                match resolved {
                    Ok(addrs) => addrs.collect(),
                    Err(e) => {
                        warn!(host = %host, error = %e, "An error occurred while handling DNS");
                        return Err(Error::Io(e));
                    }
                }
            }
        };

        let mut last_err = None;
        for addr in addrs {
            recorder.record(TraceEvent::ConnectStart);
            let result = TcpStream::connect(addr).await;
            recorder.record(TraceEvent::ConnectDone);
            match result {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "unable to connect to host");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => Error::Io(e),
            None => Error::Transport(format!("no addresses resolved for {}", host)),
        })
    }
}

// =============================================================================
// Prober
// =============================================================================

/// Executes instrumented probes.
pub struct Prober {
    config: ProbeConfig,
    connector: Arc<dyn Connector>,
}

impl Prober {
    /// Create a prober dialing over plain TCP.
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// Create a prober with a custom connector.
    pub fn with_connector(config: ProbeConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Host to dial for `endpoint` under `mode`.
    ///
    /// Fails with `MissingAddress` when the endpoint has no address, in
    /// either mode, before any network I/O happens.
    pub fn dial_host<'a>(&'a self, mode: OperatingMode, endpoint: &'a Endpoint) -> Result<&'a str> {
        let address = endpoint.address().ok_or_else(|| Error::MissingAddress {
            name: endpoint.name.clone(),
        })?;

        Ok(match mode {
            OperatingMode::InCluster => address,
            OperatingMode::OutOfCluster => &self.config.local_host,
        })
    }

    /// Probe one endpoint.
    ///
    /// Bounded by the configured timeout and aborted when `cancel` fires.
    /// Transport failures are returned as errors; no metrics are produced
    /// for a failed probe.
    #[instrument(skip(self, endpoint, cancel), fields(dest_pod = %endpoint.name, dest_node = %endpoint.node))]
    pub async fn probe(
        &self,
        mode: OperatingMode,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> Result<ProbeOutcome> {
        let host = self.dial_host(mode, endpoint)?;
        let authority = authority(host, self.config.port);
        info!(target_addr = %authority, "probing: {}", endpoint);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(self.config.timeout, self.execute(endpoint, host, &authority)) => {
                result.unwrap_or_else(|_| Err(Error::Timeout {
                    target: authority.clone(),
                    after: self.config.timeout,
                }))
            }
        }
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        host: &str,
        authority: &str,
    ) -> Result<ProbeOutcome> {
        let recorder = TraceRecorder::new();
        recorder.record(TraceEvent::GetConn);

        let stream = self
            .connector
            .connect(host, self.config.port, &recorder)
            .await?;
        let io = TokioIo::new(TracedStream::new(stream, Arc::clone(&recorder)));

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "probe connection closed with error");
            }
        });
        recorder.record(TraceEvent::GotConn);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(HOST, authority)
            .header(CONNECTION, "close")
            .header(USER_AGENT, PROBE_USER_AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(|e| Error::Internal(format!("Failed to build probe request: {}", e)))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        let completed_at = Instant::now();
        drop(sender);

        let durations =
            DerivedDurations::derive(&recorder.snapshot(), completed_at).without_dns();
        debug!(status = %status, bytes = body.len(), "response");
        info!(
            total = ?durations.total,
            connect = ?durations.connect,
            server_processing = ?durations.server_processing,
            content_transfer = ?durations.content_transfer,
            "probe complete"
        );

        Ok(ProbeOutcome {
            endpoint: endpoint.clone(),
            durations,
            status: status.as_u16(),
            body_bytes: body.len(),
        })
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("config", &self.config)
            .finish()
    }
}

/// `host:port`, bracketing IPv6 literals.
fn authority(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]:{}", v6, port),
        _ => format!("{}:{}", host, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Connector that counts calls and delegates to plain TCP.
    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(
            &self,
            host: &str,
            port: u16,
            recorder: &TraceRecorder,
        ) -> Result<TcpStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TcpConnector.connect(host, port, recorder).await
        }
    }

    fn endpoint(ip: Option<&str>) -> Endpoint {
        Endpoint::new("test-pod", "default", ip.map(String::from), "n1")
    }

    fn config(port: u16, timeout: Duration) -> ProbeConfig {
        ProbeConfig {
            port,
            timeout,
            ..Default::default()
        }
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.local_host, "127.0.0.1");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_dial_host_in_cluster_uses_endpoint_ip() {
        let prober = Prober::new(ProbeConfig::default());
        let ep = endpoint(Some("1.2.3.4"));
        assert_eq!(
            prober.dial_host(OperatingMode::InCluster, &ep).unwrap(),
            "1.2.3.4"
        );
    }

    #[test]
    fn test_dial_host_out_of_cluster_uses_local_host() {
        let prober = Prober::new(ProbeConfig::default());
        let ep = endpoint(Some("1.2.3.4"));
        assert_eq!(
            prober.dial_host(OperatingMode::OutOfCluster, &ep).unwrap(),
            "127.0.0.1"
        );
    }

    #[test]
    fn test_authority_brackets_ipv6() {
        assert_eq!(authority("10.0.0.5", 8080), "10.0.0.5:8080");
        assert_eq!(authority("fd00::5", 8080), "[fd00::5]:8080");
        assert_eq!(authority("localhost", 8080), "localhost:8080");
    }

    #[tokio::test]
    async fn test_missing_address_rejected_before_io() {
        let connector = Arc::new(CountingConnector::default());
        let prober = Prober::with_connector(ProbeConfig::default(), connector.clone());
        let cancel = CancellationToken::new();

        for mode in [OperatingMode::InCluster, OperatingMode::OutOfCluster] {
            for ep in [endpoint(None), endpoint(Some(""))] {
                let result = prober.probe(mode, &ep, &cancel).await;
                assert_matches!(result, Err(Error::MissingAddress { name }) if name == "test-pod");
            }
        }

        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = Prober::new(config(port, Duration::from_secs(5)));
        let result = prober
            .probe(
                OperatingMode::InCluster,
                &endpoint(Some("127.0.0.1")),
                &CancellationToken::new(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_unresponsive_target_times_out() {
        // Accepted by the kernel backlog but never answered
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = Prober::new(config(port, Duration::from_millis(200)));
        let result = prober
            .probe(
                OperatingMode::InCluster,
                &endpoint(Some("127.0.0.1")),
                &CancellationToken::new(),
            )
            .await;

        assert_matches!(result, Err(Error::Timeout { after, .. }) if after == Duration::from_millis(200));
        drop(listener);
    }

    #[tokio::test]
    async fn test_cancelled_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = Prober::new(config(port, Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = prober
            .probe(OperatingMode::InCluster, &endpoint(Some("127.0.0.1")), &cancel)
            .await;

        assert_matches!(result, Err(Error::Cancelled));
        drop(listener);
    }
}
