//! Static Discovery Adapter
//!
//! Implements the `EndpointDiscovery` port over an in-memory endpoint list.
//! Used by tests and for probing a fixed set of peers without a cluster.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{Endpoint, EndpointDiscovery};
use crate::error::{Error, Result};

/// In-memory endpoint list.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    endpoints: RwLock<Vec<Endpoint>>,
    fail_with: RwLock<Option<String>>,
}

impl StaticDiscovery {
    /// Create a discovery source returning `endpoints` on every call.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints: RwLock::new(endpoints),
            fail_with: RwLock::new(None),
        }
    }

    /// Replace the endpoint set returned by subsequent waves.
    pub fn replace(&self, endpoints: Vec<Endpoint>) {
        *self.endpoints.write() = endpoints;
    }

    /// Make every subsequent listing fail with the given message.
    pub fn fail(&self, reason: impl Into<String>) {
        *self.fail_with.write() = Some(reason.into());
    }
}

#[async_trait]
impl EndpointDiscovery for StaticDiscovery {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        if let Some(reason) = self.fail_with.read().clone() {
            return Err(Error::DiscoveryFailed(reason));
        }
        Ok(self.endpoints.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_static_discovery_returns_snapshot() {
        let discovery = StaticDiscovery::new(vec![Endpoint::new(
            "p1",
            "default",
            Some("10.0.0.5".into()),
            "n1",
        )]);

        let first = discovery.list_endpoints().await.unwrap();
        assert_eq!(first.len(), 1);

        discovery.replace(vec![]);
        assert!(discovery.list_endpoints().await.unwrap().is_empty());
        // earlier snapshot is unaffected
        assert_eq!(first[0].name, "p1");
    }

    #[tokio::test]
    async fn test_static_discovery_failure() {
        let discovery = StaticDiscovery::default();
        discovery.fail("apiserver unreachable");

        let result = discovery.list_endpoints().await;
        assert_matches!(result, Err(Error::DiscoveryFailed(msg)) if msg.contains("unreachable"));
    }
}
