//! Scout
//!
//! Probes every scout peer on a fixed interval and serves the resulting
//! latency series.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          Scout                            │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌────────────┐  │
//! │  │  Probe Loop  │───▶│   Metrics    │◀───│   Server   │  │
//! │  │   (writes)   │    │ (aggregator) │    │  (reads)   │  │
//! │  └──────────────┘    └──────────────┘    └────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use scout::adapters::KubernetesDiscovery;
use scout::config::{init_logging, Args};
use scout::controller::ProbeLoop;
use scout::domain::{OperatingMode, SourceIdentity};
use scout::metrics::LatencyMetrics;
use scout::probe::Prober;
use scout::{server, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);
    args.validate()?;

    let mode = OperatingMode::detect();
    let source = SourceIdentity::from_env(mode);

    info!("Starting Scout");
    info!("  Mode: {}", mode);
    info!("  Source: {} / {}", source.node, source.instance);
    info!("  Label selector: {}", args.label_selector);
    info!("  Wave interval: {}s", args.interval_seconds);
    info!("  Probe timeout: {}s", args.probe_timeout_seconds);
    info!("  Concurrency: {}", args.concurrency);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let metrics = Arc::new(LatencyMetrics::new(&args.metric_prefix, source)?);

    // Start the exposition server first so it is reachable even while
    // discovery is still connecting
    let listener = server::bind(&args.listen_addr).await?;
    let server_handle = tokio::spawn(server::serve(
        listener,
        Arc::clone(&metrics),
        cancel.clone(),
    ));

    let kubeconfig = match mode {
        OperatingMode::InCluster => None,
        OperatingMode::OutOfCluster => args.kubeconfig_path(),
    };
    let client = KubernetesDiscovery::client_for(mode, kubeconfig.as_deref())
        .await
        .inspect_err(|e| error!("Failed to create Kubernetes client: {}", e))?;
    let discovery = KubernetesDiscovery::new(client, args.label_selector.clone())
        .with_namespace(args.namespace.clone());

    let probe_loop = ProbeLoop::new(
        args.probe_loop_config(mode),
        Arc::new(discovery),
        Arc::new(Prober::new(args.probe_config())),
        Arc::clone(&metrics),
    );

    let result = probe_loop.run(cancel.clone()).await;

    // Discovery failure is fatal; bring the server down with us
    cancel.cancel();
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    info!("Scout shutdown complete");
    result
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
