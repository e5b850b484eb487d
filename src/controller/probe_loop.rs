//! Probe Loop
//!
//! Drives waves of probes: discover the current endpoints, probe each one,
//! feed successful outcomes into the metrics, sleep, repeat. A failed probe
//! only skips that endpoint for the wave; a failed discovery stops the loop.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::ports::{Endpoint, EndpointDiscovery, OperatingMode};
use crate::error::{Error, Result};
use crate::metrics::LatencyMetrics;
use crate::probe::Prober;

/// Sleep between the end of one wave and the start of the next.
pub const DEFAULT_WAVE_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration for the probe loop
#[derive(Debug, Clone)]
pub struct ProbeLoopConfig {
    /// Operating mode for every probe
    pub mode: OperatingMode,

    /// Inter-wave sleep
    pub interval: Duration,

    /// Probes in flight per wave; 1 probes sequentially
    pub concurrency: usize,
}

impl Default for ProbeLoopConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::InCluster,
            interval: DEFAULT_WAVE_INTERVAL,
            concurrency: 1,
        }
    }
}

/// Outcome counts of one wave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaveSummary {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-endpoint result within a wave.
enum ProbeResult {
    Recorded,
    Skipped,
    Cancelled,
}

/// Repeatedly probes every discovered endpoint.
pub struct ProbeLoop {
    config: ProbeLoopConfig,
    discovery: Arc<dyn EndpointDiscovery>,
    prober: Arc<Prober>,
    metrics: Arc<LatencyMetrics>,
}

impl ProbeLoop {
    pub fn new(
        config: ProbeLoopConfig,
        discovery: Arc<dyn EndpointDiscovery>,
        prober: Arc<Prober>,
        metrics: Arc<LatencyMetrics>,
    ) -> Self {
        Self {
            config,
            discovery,
            prober,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<LatencyMetrics> {
        &self.metrics
    }

    /// Run waves until `cancel` fires or discovery fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            mode = %self.config.mode,
            interval = ?self.config.interval,
            concurrency = self.config.concurrency,
            "Starting probe loop"
        );

        while !cancel.is_cancelled() {
            match self.run_wave(&cancel).await {
                Ok(summary) => info!(
                    discovered = summary.discovered,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    "Wave complete"
                ),
                Err(e) => {
                    error!("Error fetching pods: {}", e);
                    return Err(e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Probe loop shutdown complete");
        Ok(())
    }

    /// Discover endpoints and probe each of them once.
    #[instrument(skip(self, cancel), fields(wave = %Uuid::new_v4()))]
    pub async fn run_wave(&self, cancel: &CancellationToken) -> Result<WaveSummary> {
        let endpoints = self.discovery.list_endpoints().await?;

        info!("scout pods:");
        for ep in &endpoints {
            info!("\tnode: {}", ep.node);
            info!(
                "\t\t{}.{}.{}",
                ep.name,
                ep.namespace,
                ep.address().unwrap_or_default()
            );
        }

        let mut summary = WaveSummary {
            discovered: endpoints.len(),
            ..Default::default()
        };

        let results: Vec<ProbeResult> = if self.config.concurrency <= 1 {
            let mut results = Vec::with_capacity(endpoints.len());
            for ep in &endpoints {
                let result = self.probe_one(ep, cancel).await;
                let stop = matches!(result, ProbeResult::Cancelled);
                results.push(result);
                if stop {
                    break;
                }
            }
            results
        } else {
            stream::iter(endpoints.iter())
                .map(|ep| self.probe_one(ep, cancel))
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await
        };

        for result in results {
            match result {
                ProbeResult::Recorded => summary.succeeded += 1,
                ProbeResult::Skipped => summary.failed += 1,
                ProbeResult::Cancelled => {}
            }
        }

        Ok(summary)
    }

    async fn probe_one(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> ProbeResult {
        match self.prober.probe(self.config.mode, endpoint, cancel).await {
            Ok(outcome) => {
                self.metrics.record(&outcome);
                ProbeResult::Recorded
            }
            Err(Error::Cancelled) => ProbeResult::Cancelled,
            Err(e) => {
                warn!(dest_pod = %endpoint.name, error = %e, "Probe failed, skipping endpoint");
                ProbeResult::Skipped
            }
        }
    }
}

impl std::fmt::Debug for ProbeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeLoop")
            .field("config", &self.config)
            .finish()
    }
}
