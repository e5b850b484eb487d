//! Domain Ports (Port/Adapter Pattern)
//!
//! Value objects shared by every component and the discovery port that
//! infrastructure adapters implement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   Endpoint │ OperatingMode │ SourceIdentity          │    │
//! │  │                EndpointDiscovery (port)              │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │     KubernetesDiscovery │ StaticDiscovery           │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::Result;

/// Placeholder identity used when running outside the cluster.
pub const LOCAL_PLACEHOLDER: &str = "localhost";

// =============================================================================
// Value Objects
// =============================================================================

/// A probe target, as reported by discovery for one wave.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Instance (pod) name
    pub name: String,
    /// Namespace the instance lives in
    pub namespace: String,
    /// Instance IP, if one has been assigned yet
    pub ip: Option<String>,
    /// Node the instance is scheduled on
    pub node: String,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        ip: Option<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ip,
            node: node.into(),
        }
    }

    /// The endpoint's address, ignoring empty strings.
    pub fn address(&self) -> Option<&str> {
        self.ip.as_deref().filter(|ip| !ip.trim().is_empty())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{} @ node: {}",
            self.name,
            self.namespace,
            self.address().unwrap_or("<none>"),
            self.node
        )
    }
}

/// Where this process runs relative to the probed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Dial each endpoint's own address.
    InCluster,
    /// Dial a fixed local address regardless of endpoint.
    OutOfCluster,
}

impl OperatingMode {
    /// Detect the mode from the environment: a set `HOSTNAME` means we are
    /// running inside a pod.
    pub fn detect() -> Self {
        Self::from_hostname(std::env::var("HOSTNAME").ok().as_deref())
    }

    pub fn from_hostname(hostname: Option<&str>) -> Self {
        match hostname {
            Some(h) if !h.is_empty() => OperatingMode::InCluster,
            _ => OperatingMode::OutOfCluster,
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::InCluster => write!(f, "in-cluster"),
            OperatingMode::OutOfCluster => write!(f, "out-of-cluster"),
        }
    }
}

/// Identity of the probing side, used as the `src_*` labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub node: String,
    pub instance: String,
}

impl SourceIdentity {
    pub fn new(node: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            instance: instance.into(),
        }
    }

    /// Placeholder identity for out-of-cluster runs.
    pub fn local() -> Self {
        Self::new(LOCAL_PLACEHOLDER, LOCAL_PLACEHOLDER)
    }

    /// Read `NODE_NAME`/`HOSTNAME` in-cluster, or fall back to the placeholder.
    pub fn from_env(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::OutOfCluster => Self::local(),
            OperatingMode::InCluster => Self::new(
                std::env::var("NODE_NAME").unwrap_or_default(),
                std::env::var("HOSTNAME").unwrap_or_default(),
            ),
        }
    }
}

// =============================================================================
// Discovery Port
// =============================================================================

/// Port for enumerating the endpoints to probe in a wave.
///
/// The returned list is a snapshot; callers treat it as immutable for the
/// duration of one wave.
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// List all endpoints currently matching the configured selector.
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;
}
