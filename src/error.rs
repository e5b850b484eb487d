//! Error types for Scout

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering, probing and exporting
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Probe Errors
    // =========================================================================
    /// Endpoint has no usable address; rejected before any network I/O
    #[error("IP address for {name} could not be determined")]
    MissingAddress { name: String },

    /// I/O error while resolving, connecting, writing or reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP protocol error on the probe connection
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Transport failure that is not a raw I/O or HTTP error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Probe exceeded its bounded timeout
    #[error("Probe to {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    /// Probe abandoned because shutdown was requested
    #[error("Probe cancelled")]
    Cancelled,

    // =========================================================================
    // Discovery Errors
    // =========================================================================
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Endpoint enumeration failed for a non-API reason
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that only affect one endpoint for one wave.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Http(_) | Error::Transport(_) | Error::Timeout { .. }
        )
    }

    /// True for failures that prevent enumerating endpoints at all.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::DiscoveryFailed(_))
    }
}
