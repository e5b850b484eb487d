//! Kubernetes Discovery Adapter
//!
//! Implements the `EndpointDiscovery` port by listing pods that match a
//! label selector.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info, instrument};

use crate::domain::ports::{Endpoint, EndpointDiscovery, OperatingMode};
use crate::error::{Error, Result};

/// Default label selector matching every scout pod.
pub const DEFAULT_LABEL_SELECTOR: &str = "app=scout";

/// Kubernetes-based endpoint discovery.
#[derive(Clone)]
pub struct KubernetesDiscovery {
    client: Client,
    label_selector: String,
    namespace: Option<String>,
}

impl KubernetesDiscovery {
    /// Create a discovery adapter over an existing client.
    pub fn new(client: Client, label_selector: impl Into<String>) -> Self {
        Self {
            client,
            label_selector: label_selector.into(),
            namespace: None,
        }
    }

    /// Restrict listing to a single namespace.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    /// Build a client for the given mode.
    ///
    /// In-cluster uses the service account mounted into the pod; out of the
    /// cluster reads the kubeconfig at `kubeconfig`, falling back to the
    /// usual inference rules when no path is given.
    pub async fn client_for(mode: OperatingMode, kubeconfig: Option<&Path>) -> Result<Client> {
        let config = match mode {
            OperatingMode::InCluster => Config::incluster()
                .map_err(|e| Error::DiscoveryFailed(format!("in-cluster config: {}", e)))?,
            OperatingMode::OutOfCluster => match kubeconfig {
                Some(path) => {
                    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                        Error::DiscoveryFailed(format!(
                            "reading kubeconfig {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| Error::DiscoveryFailed(format!("kubeconfig: {}", e)))?
                }
                None => Config::infer()
                    .await
                    .map_err(|e| Error::DiscoveryFailed(format!("infer config: {}", e)))?,
            },
        };

        let client = Client::try_from(config)?;
        info!(mode = %mode, "Connected to Kubernetes cluster");
        Ok(client)
    }

    fn pods_api(&self) -> Api<Pod> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Convert a pod into an endpoint. Pods without a name are dropped.
    fn from_pod(pod: &Pod) -> Option<Endpoint> {
        let name = pod.metadata.name.clone()?;
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let node = pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .unwrap_or_default();
        let ip = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.clone())
            .filter(|ip| !ip.is_empty());

        Some(Endpoint {
            name,
            namespace,
            ip,
            node,
        })
    }
}

impl std::fmt::Debug for KubernetesDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesDiscovery")
            .field("label_selector", &self.label_selector)
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[async_trait]
impl EndpointDiscovery for KubernetesDiscovery {
    #[instrument(skip(self), fields(selector = %self.label_selector))]
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let params = ListParams::default().labels(&self.label_selector);
        let list = self.pods_api().list(&params).await?;

        let endpoints: Vec<Endpoint> = list.items.iter().filter_map(Self::from_pod).collect();
        debug!(count = endpoints.len(), "Listed scout pods");
        Ok(endpoints)
    }
}
