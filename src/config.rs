//! Configuration
//!
//! Command-line/environment arguments and logging setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::adapters::DEFAULT_LABEL_SELECTOR;
use crate::controller::ProbeLoopConfig;
use crate::domain::ports::OperatingMode;
use crate::error::{Error, Result};
use crate::probe::ProbeConfig;

/// Scout - pod-to-pod latency prober
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Metrics and liveness server bind address
    #[arg(long, env = "SCOUT_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Port dialed on every probe target
    #[arg(long, env = "SCOUT_PORT", default_value = "8080")]
    pub port: u16,

    /// Label selector used to discover peers
    #[arg(long, env = "SCOUT_LABEL_SELECTOR", default_value = DEFAULT_LABEL_SELECTOR)]
    pub label_selector: String,

    /// Restrict discovery to one namespace (default: all namespaces)
    #[arg(long, env = "SCOUT_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds to sleep between waves
    #[arg(long, env = "SCOUT_INTERVAL_SECONDS", default_value = "15")]
    pub interval_seconds: u64,

    /// Per-probe timeout in seconds
    #[arg(long, env = "SCOUT_PROBE_TIMEOUT_SECONDS", default_value = "10")]
    pub probe_timeout_seconds: u64,

    /// Probes in flight per wave (1 = sequential)
    #[arg(long, env = "SCOUT_CONCURRENCY", default_value = "1")]
    pub concurrency: usize,

    /// Prefix of every exported metric
    #[arg(long, env = "SCOUT_METRIC_PREFIX", default_value = "scout")]
    pub metric_prefix: String,

    /// Host dialed when running outside the cluster
    #[arg(long, env = "SCOUT_LOCAL_HOST", default_value = "127.0.0.1")]
    pub local_host: String,

    /// Path to the kubeconfig file (out-of-cluster only)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(Error::Config("interval must be at least 1 second".into()));
        }
        if self.probe_timeout_seconds == 0 {
            return Err(Error::Config("probe timeout must be at least 1 second".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.local_host.trim().is_empty() {
            return Err(Error::Config("local host must not be empty".into()));
        }
        Ok(())
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            port: self.port,
            local_host: self.local_host.clone(),
            timeout: Duration::from_secs(self.probe_timeout_seconds),
        }
    }

    pub fn probe_loop_config(&self, mode: OperatingMode) -> ProbeLoopConfig {
        ProbeLoopConfig {
            mode,
            interval: Duration::from_secs(self.interval_seconds),
            concurrency: self.concurrency,
        }
    }

    /// Kubeconfig path out of the cluster: the explicit flag, else
    /// `~/.kube/config` when a home directory is known.
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
        })
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

pub fn init_logging(args: &Args) {
    let mut filter = EnvFilter::from_default_env().add_directive(parse_level(&args.log_level).into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
