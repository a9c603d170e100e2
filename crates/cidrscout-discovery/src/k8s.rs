//! Kubernetes access for network discovery.
//!
//! This module provides the `ClusterApi` trait, the narrow slice of the cluster
//! API that discovery reads from (and the one write it attempts), along with
//! the `kube`-backed `KubeClusterApi`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::crd::ClusterMeshConfig;
use crate::{DiscoveryError, Result};

/// The cluster operations network discovery depends on.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List pods in all namespaces matching a label selector.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>>;

    /// List all nodes in the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Create a Service in the given namespace.
    ///
    /// The raw `kube::Error` is returned so callers can inspect an API
    /// rejection's status and message.
    ///
    /// # Errors
    ///
    /// Returns the API server's rejection or a transport error.
    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> std::result::Result<Service, kube::Error>;

    /// Delete a Service. A Service that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails for any reason other than 404.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    /// Fetch the cluster-scoped `ClusterMeshConfig` with the given name, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the get call fails for any reason other than 404.
    async fn get_mesh_config(&self, name: &str) -> Result<Option<ClusterMeshConfig>>;
}

/// `ClusterApi` backed by a live Kubernetes client.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Create a cluster API handle from an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().labels(label_selector);

        let list = pods.list(&params).await.map_err(|e| {
            DiscoveryError::query(
                format!("error listing Pods by label selector {label_selector:?}"),
                e,
            )
        })?;

        debug!(label_selector, count = list.items.len(), "Listed pods");
        Ok(list.items)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());

        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| DiscoveryError::query("error listing nodes", e))?;

        debug!(count = list.items.len(), "Listed nodes");
        Ok(list.items)
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> std::result::Result<Service, kube::Error> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services.create(&PostParams::default(), service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);

        match services.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(DiscoveryError::query(
                format!("error deleting Service {namespace}/{name}"),
                e,
            )),
        }
    }

    async fn get_mesh_config(&self, name: &str) -> Result<Option<ClusterMeshConfig>> {
        let configs: Api<ClusterMeshConfig> = Api::all(self.client.clone());

        configs
            .get_opt(name)
            .await
            .map_err(|e| DiscoveryError::query(format!("error retrieving ClusterMeshConfig {name:?}"), e))
    }
}

/// An in-memory cluster for testing without a real Kubernetes API server.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, NodeSpec, PodSpec};
    use kube::api::ObjectMeta;
    use kube::core::ErrorResponse;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    use crate::crd::ClusterMeshConfigSpec;

    /// The operations recorded by [`MockClusterApi`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockCall {
        /// `list_pods`
        ListPods,
        /// `list_nodes`
        ListNodes,
        /// `create_service`
        CreateService,
        /// `delete_service`
        DeleteService,
        /// `get_mesh_config`
        GetMeshConfig,
    }

    /// How the mock answers a Service creation.
    #[derive(Debug, Clone)]
    pub enum ServiceCreation {
        /// Store the Service and return it.
        Accept,
        /// Fail with the given API status.
        Reject(ErrorResponse),
    }

    #[derive(Default)]
    struct State {
        pods: Vec<Pod>,
        nodes: Vec<Node>,
        services: HashMap<(String, String), Service>,
        mesh_configs: HashMap<String, ClusterMeshConfig>,
        failures: HashMap<MockCall, ErrorResponse>,
        calls: HashMap<MockCall, usize>,
        selectors: Vec<String>,
    }

    /// A mock cluster that serves pods, nodes and mesh configs from memory and
    /// counts every call made against it.
    pub struct MockClusterApi {
        state: Mutex<State>,
        creation: Mutex<ServiceCreation>,
        latency: Option<Duration>,
    }

    impl Default for MockClusterApi {
        fn default() -> Self {
            Self {
                state: Mutex::new(State::default()),
                creation: Mutex::new(ServiceCreation::Accept),
                latency: None,
            }
        }
    }

    /// Build the rejection an API server's IP allocator returns for a Service
    /// whose cluster IP lies outside `service_cidr`.
    #[must_use]
    pub fn allocator_rejection(service_cidr: &str) -> ErrorResponse {
        invalid(format!(
            "Service \"invalid-svc\" is invalid: spec.clusterIPs: Invalid value: []string{{\"1.1.1.1\"}}: \
             failed to allocated ip:1.1.1.1 with error:provided IP is not in the valid range. \
             The range of valid IPs is {service_cidr}"
        ))
    }

    /// Build a 422 Invalid status with an arbitrary message.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: message.into(),
            reason: "Invalid".to_string(),
            code: 422,
        }
    }

    /// Build a 403 Forbidden status.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: message.into(),
            reason: "Forbidden".to_string(),
            code: 403,
        }
    }

    /// Build a pod with a single container.
    #[must_use]
    pub fn pod(
        namespace: &str,
        name: &str,
        labels: &[(&str, &str)],
        command: &[&str],
        args: &[&str],
    ) -> Pod {
        let to_vec = |items: &[&str]| -> Option<Vec<String>> {
            if items.is_empty() {
                None
            } else {
                Some(items.iter().map(ToString::to_string).collect())
            }
        };

        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: name.to_string(),
                    command: to_vec(command),
                    args: to_vec(args),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build a node with the given Pod CIDR (empty for none).
    #[must_use]
    pub fn node(name: &str, pod_cidr: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                pod_cidr: (!pod_cidr.is_empty()).then(|| pod_cidr.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
        selector
            .split(',')
            .filter(|term| !term.trim().is_empty())
            .all(|term| match term.split_once('=') {
                Some((key, value)) => labels
                    .and_then(|l| l.get(key.trim()))
                    .is_some_and(|v| v == value.trim()),
                None => labels.is_some_and(|l| l.contains_key(term.trim())),
            })
    }

    impl MockClusterApi {
        /// Create an empty mock cluster that accepts every Service.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every call wait before answering.
        #[must_use]
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Add a pod.
        #[must_use]
        pub fn with_pod(self, pod: Pod) -> Self {
            self.state.lock().pods.push(pod);
            self
        }

        /// Add a node.
        #[must_use]
        pub fn with_node(self, node: Node) -> Self {
            self.state.lock().nodes.push(node);
            self
        }

        /// Reject Service creation the way an allocator for `service_cidr` does.
        #[must_use]
        pub fn with_service_cidr(self, service_cidr: &str) -> Self {
            self.set_service_creation(ServiceCreation::Reject(allocator_rejection(service_cidr)));
            self
        }

        /// Add a `ClusterMeshConfig` object.
        #[must_use]
        pub fn with_mesh_config(self, name: &str, spec: ClusterMeshConfigSpec) -> Self {
            self.state
                .lock()
                .mesh_configs
                .insert(name.to_string(), ClusterMeshConfig::new(name, spec));
            self
        }

        /// Make an operation fail with the given status.
        #[must_use]
        pub fn failing(self, call: MockCall, error: ErrorResponse) -> Self {
            self.state.lock().failures.insert(call, error);
            self
        }

        /// Set how Service creation is answered.
        pub fn set_service_creation(&self, creation: ServiceCreation) {
            *self.creation.lock() = creation;
        }

        /// Number of times an operation was called.
        #[must_use]
        pub fn calls(&self, call: MockCall) -> usize {
            self.state.lock().calls.get(&call).copied().unwrap_or(0)
        }

        /// Label selectors passed to `list_pods`, in call order.
        #[must_use]
        pub fn selectors(&self) -> Vec<String> {
            self.state.lock().selectors.clone()
        }

        /// Number of Services currently stored.
        #[must_use]
        pub fn service_count(&self) -> usize {
            self.state.lock().services.len()
        }

        async fn enter(&self, call: MockCall) -> std::result::Result<(), kube::Error> {
            let failure = {
                let mut state = self.state.lock();
                *state.calls.entry(call).or_insert(0) += 1;
                state.failures.get(&call).cloned()
            };

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            match failure {
                Some(error) => Err(kube::Error::Api(error)),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ClusterApi for MockClusterApi {
        async fn list_pods(&self, label_selector: &str) -> Result<Vec<Pod>> {
            self.state.lock().selectors.push(label_selector.to_string());
            self.enter(MockCall::ListPods).await.map_err(|e| {
                DiscoveryError::query(
                    format!("error listing Pods by label selector {label_selector:?}"),
                    e,
                )
            })?;

            Ok(self
                .state
                .lock()
                .pods
                .iter()
                .filter(|p| selector_matches(label_selector, p.metadata.labels.as_ref()))
                .cloned()
                .collect())
        }

        async fn list_nodes(&self) -> Result<Vec<Node>> {
            self.enter(MockCall::ListNodes)
                .await
                .map_err(|e| DiscoveryError::query("error listing nodes", e))?;

            Ok(self.state.lock().nodes.clone())
        }

        async fn create_service(
            &self,
            namespace: &str,
            service: &Service,
        ) -> std::result::Result<Service, kube::Error> {
            self.enter(MockCall::CreateService).await?;

            let creation = self.creation.lock().clone();
            match creation {
                ServiceCreation::Reject(error) => Err(kube::Error::Api(error)),
                ServiceCreation::Accept => {
                    let name = service.metadata.name.clone().unwrap_or_default();
                    let mut stored = service.clone();
                    stored.metadata.namespace = Some(namespace.to_string());
                    self.state
                        .lock()
                        .services
                        .insert((namespace.to_string(), name), stored.clone());
                    Ok(stored)
                }
            }
        }

        async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
            self.enter(MockCall::DeleteService).await.map_err(|e| {
                DiscoveryError::query(format!("error deleting Service {namespace}/{name}"), e)
            })?;

            self.state
                .lock()
                .services
                .remove(&(namespace.to_string(), name.to_string()));
            Ok(())
        }

        async fn get_mesh_config(&self, name: &str) -> Result<Option<ClusterMeshConfig>> {
            self.enter(MockCall::GetMeshConfig).await.map_err(|e| {
                DiscoveryError::query(format!("error retrieving ClusterMeshConfig {name:?}"), e)
            })?;

            Ok(self.state.lock().mesh_configs.get(name).cloned())
        }
    }

}
