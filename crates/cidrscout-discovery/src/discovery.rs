//! Discovery orchestration.
//!
//! This module provides `NetworkDiscovery`, which runs the Pod and Service
//! fallback chains against a [`ClusterApi`] and assembles the
//! [`ClusterNetwork`] result.

use std::sync::Arc;
use std::time::Duration;

use cidrscout_core::{ClusterNetwork, NetworkPlugin};
use tracing::{debug, info, warn};

use crate::chain::FallbackChain;
use crate::k8s::ClusterApi;
use crate::nodes::find_pod_cidr_from_node_spec;
use crate::params::{
    find_pod_command_parameter, CLUSTER_CIDR_FLAG, KUBE_APISERVER_SELECTOR,
    KUBE_CONTROLLER_MANAGER_SELECTOR, KUBE_PROXY_SELECTOR, SERVICE_CLUSTER_IP_RANGE_FLAG,
};
use crate::probe::find_service_cidr_from_probe;
use crate::{DiscoveryConfig, DiscoveryError, Result};

/// Plugin-agnostic cluster network discovery.
///
/// A pass is read-mostly and holds no state between calls, so it can be run
/// once per reconciliation.
pub struct NetworkDiscovery<A: ClusterApi + ?Sized> {
    api: Arc<A>,
    config: DiscoveryConfig,
}

impl<A: ClusterApi + ?Sized> NetworkDiscovery<A> {
    /// Create a discovery engine over the given cluster API.
    #[must_use]
    pub fn new(api: Arc<A>, config: DiscoveryConfig) -> Self {
        Self { api, config }
    }

    /// Run one discovery pass.
    ///
    /// Returns `Ok(None)` when nothing was found anywhere. No partial result is
    /// ever returned alongside an error.
    ///
    /// # Errors
    ///
    /// Returns the first query failure, probe-invariant violation or
    /// unparsable probe rejection encountered.
    pub async fn discover(&self) -> Result<Option<ClusterNetwork>> {
        let mut network = ClusterNetwork::new(NetworkPlugin::Generic);

        if let Some(mesh) = self.api.get_mesh_config(&self.config.mesh_config_name).await? {
            debug!(name = %self.config.mesh_config_name, "Found mesh configuration");
            network.global_cidr = mesh.spec.global_cidr().map(ToString::to_string);
            network.clusterset_ip_cidr = mesh.spec.clusterset_ip_cidr().map(ToString::to_string);
        }

        if let Some(cidr) = self.find_pod_cidr().await? {
            network.pod_cidrs.push(cidr);
        }

        if let Some(cidr) = self.find_service_cidr().await? {
            network.service_cidrs.push(cidr);
        }

        Ok(non_empty(network))
    }

    /// Run one discovery pass that must finish within `deadline`.
    ///
    /// When the deadline cuts the pass short, the probe Service is deleted
    /// before returning, since the pass may have stopped between an unexpected
    /// acceptance and its cleanup. Dropping a bare [`Self::discover`] future
    /// gives no such guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Cancelled`] if the deadline elapses, otherwise
    /// whatever [`Self::discover`] returns.
    pub async fn discover_within(&self, deadline: Duration) -> Result<Option<ClusterNetwork>> {
        match tokio::time::timeout(deadline, self.discover()).await {
            Ok(result) => result,
            Err(_) => {
                self.remove_probe_service(deadline).await;
                Err(DiscoveryError::Cancelled(deadline))
            }
        }
    }

    /// Delete the probe Service, if present. Failures are only logged.
    async fn remove_probe_service(&self, deadline: Duration) {
        let namespace = self.config.probe_namespace.as_str();
        let name = self.config.probe_service_name.as_str();

        match tokio::time::timeout(deadline, self.api.delete_service(namespace, name)).await {
            Ok(Ok(())) => debug!(namespace, name, "Removed probe Service after cancellation"),
            Ok(Err(e)) => {
                warn!(namespace, name, error = %e, "Failed to remove probe Service after cancellation");
            }
            Err(_) => warn!(namespace, name, "Timed out removing probe Service after cancellation"),
        }
    }

    /// Find the Pod CIDR.
    ///
    /// Tried in order: kube-controller-manager's `--cluster-cidr`, kube-proxy's
    /// `--cluster-cidr`, then the single-node spec.
    ///
    /// # Errors
    ///
    /// Returns the first query failure.
    pub async fn find_pod_cidr(&self) -> Result<Option<String>> {
        let api = self.api.as_ref();

        FallbackChain::new("pod-cidr")
            .then(
                "kube-controller-manager",
                find_pod_command_parameter(api, KUBE_CONTROLLER_MANAGER_SELECTOR, CLUSTER_CIDR_FLAG),
            )
            .then(
                "kube-proxy",
                find_pod_command_parameter(api, KUBE_PROXY_SELECTOR, CLUSTER_CIDR_FLAG),
            )
            .then("node-spec", find_pod_cidr_from_node_spec(api))
            .resolve()
            .await
    }

    /// Find the Service CIDR.
    ///
    /// Tried in order: kube-apiserver's `--service-cluster-ip-range`,
    /// kube-controller-manager's `--service-cluster-ip-range`, then the
    /// Service creation probe.
    ///
    /// # Errors
    ///
    /// Returns the first query failure or probe error.
    pub async fn find_service_cidr(&self) -> Result<Option<String>> {
        let api = self.api.as_ref();

        FallbackChain::new("service-cidr")
            .then(
                "kube-apiserver",
                find_pod_command_parameter(api, KUBE_APISERVER_SELECTOR, SERVICE_CLUSTER_IP_RANGE_FLAG),
            )
            .then(
                "kube-controller-manager",
                find_pod_command_parameter(
                    api,
                    KUBE_CONTROLLER_MANAGER_SELECTOR,
                    SERVICE_CLUSTER_IP_RANGE_FLAG,
                ),
            )
            .then("service-probe", find_service_cidr_from_probe(api, &self.config))
            .resolve()
            .await
    }
}

/// `None` when neither the chains nor the mesh configuration found anything.
fn non_empty(network: ClusterNetwork) -> Option<ClusterNetwork> {
    if network.is_empty() {
        info!("No cluster network details discovered");
        return None;
    }
    Some(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ClusterMeshConfigSpec;
    use crate::k8s::mock::{forbidden, node, pod, MockCall, MockClusterApi};

    const POD_CIDR: &str = "1.2.3.4/16";
    const SERVICE_CIDR: &str = "4.5.6.7/16";
    const SERVICE_CIDR_FROM_PROBE: &str = "7.8.9.10/16";

    fn discovery(api: MockClusterApi) -> (Arc<MockClusterApi>, NetworkDiscovery<MockClusterApi>) {
        let api = Arc::new(api);
        let discovery = NetworkDiscovery::new(Arc::clone(&api), DiscoveryConfig::default());
        (api, discovery)
    }

    fn control_plane_pod(component: &str) -> k8s_openapi::api::core::v1::Pod {
        pod(
            "kube-system",
            component,
            &[("component", component)],
            &[
                component,
                &format!("--cluster-cidr={POD_CIDR}"),
                &format!("--service-cluster-ip-range={SERVICE_CIDR}"),
            ],
            &[],
        )
    }

    #[test]
    fn nothing_found_is_none() {
        assert_eq!(non_empty(ClusterNetwork::new(NetworkPlugin::Generic)), None);

        let mut configured = ClusterNetwork::new(NetworkPlugin::Generic);
        configured.global_cidr = Some("242.0.0.0/16".to_string());
        assert!(non_empty(configured).is_some());

        let inferred = ClusterNetwork::new(NetworkPlugin::Generic).with_service_cidr("10.96.0.0/12");
        assert!(non_empty(inferred).is_some());
    }

    #[tokio::test]
    async fn controller_manager_pod_supplies_both_ranges() {
        let (api, discovery) = discovery(
            MockClusterApi::new()
                .with_pod(control_plane_pod("kube-controller-manager"))
                .with_service_cidr(SERVICE_CIDR_FROM_PROBE),
        );

        let network = discovery.discover().await.unwrap().unwrap();
        assert_eq!(network.network_plugin, NetworkPlugin::Generic);
        assert_eq!(network.pod_cidrs, vec![POD_CIDR.to_string()]);
        assert_eq!(network.service_cidrs, vec![SERVICE_CIDR.to_string()]);
        assert_eq!(api.calls(MockCall::ListNodes), 0);
        assert_eq!(api.calls(MockCall::CreateService), 0);
    }

    #[tokio::test]
    async fn pod_chain_stops_at_first_value() {
        let (api, discovery) = discovery(
            MockClusterApi::new()
                .with_pod(control_plane_pod("kube-controller-manager"))
                .with_node(node("node1", "9.9.0.0/16")),
        );

        assert_eq!(discovery.find_pod_cidr().await.unwrap(), Some(POD_CIDR.to_string()));
        assert_eq!(api.calls(MockCall::ListPods), 1);
        assert_eq!(api.selectors(), vec![KUBE_CONTROLLER_MANAGER_SELECTOR.to_string()]);
        assert_eq!(api.calls(MockCall::ListNodes), 0);
    }

    #[tokio::test]
    async fn pod_chain_order() {
        let (api, discovery) = discovery(MockClusterApi::new().with_node(node("node1", POD_CIDR)));

        assert_eq!(discovery.find_pod_cidr().await.unwrap(), Some(POD_CIDR.to_string()));
        assert_eq!(
            api.selectors(),
            vec![
                KUBE_CONTROLLER_MANAGER_SELECTOR.to_string(),
                KUBE_PROXY_SELECTOR.to_string(),
            ]
        );
        assert_eq!(api.calls(MockCall::ListNodes), 1);
    }

    #[tokio::test]
    async fn service_chain_order() {
        let (api, discovery) = discovery(MockClusterApi::new().with_service_cidr(SERVICE_CIDR_FROM_PROBE));

        assert_eq!(
            discovery.find_service_cidr().await.unwrap(),
            Some(SERVICE_CIDR_FROM_PROBE.to_string())
        );
        assert_eq!(
            api.selectors(),
            vec![
                KUBE_APISERVER_SELECTOR.to_string(),
                KUBE_CONTROLLER_MANAGER_SELECTOR.to_string(),
            ]
        );
        assert_eq!(api.calls(MockCall::CreateService), 1);
    }

    #[tokio::test]
    async fn query_failure_aborts_without_partial_result() {
        let controller_manager = pod(
            "kube-system",
            "kube-controller-manager",
            &[("component", "kube-controller-manager")],
            &["kube-controller-manager", &format!("--cluster-cidr={POD_CIDR}")],
            &[],
        );
        let (api, discovery) = discovery(
            MockClusterApi::new()
                .with_pod(controller_manager)
                .failing(MockCall::CreateService, forbidden("services is forbidden")),
        );

        let err = discovery.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Query { .. }));
        assert_eq!(api.calls(MockCall::CreateService), 1);
    }

    #[tokio::test]
    async fn mesh_config_failure_propagates() {
        let (api, discovery) = discovery(
            MockClusterApi::new().failing(MockCall::GetMeshConfig, forbidden("forbidden")),
        );

        assert!(discovery.discover().await.is_err());
        assert_eq!(api.calls(MockCall::ListPods), 0);
    }

    #[tokio::test]
    async fn mesh_config_fields_are_copied() {
        let (_, discovery) = discovery(
            MockClusterApi::new()
                .with_service_cidr(SERVICE_CIDR_FROM_PROBE)
                .with_mesh_config(
                    "cluster-mesh",
                    ClusterMeshConfigSpec {
                        global_cidr: Some("242.112.0.0/24".to_string()),
                        clusterset_ip_cidr: Some("243.110.0.0/20".to_string()),
                    },
                ),
        );

        let network = discovery.discover().await.unwrap().unwrap();
        assert_eq!(network.global_cidr.as_deref(), Some("242.112.0.0/24"));
        assert_eq!(network.clusterset_ip_cidr.as_deref(), Some("243.110.0.0/20"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_the_pass() {
        let (_, discovery) = discovery(
            MockClusterApi::new()
                .with_service_cidr(SERVICE_CIDR_FROM_PROBE)
                .with_latency(Duration::from_secs(5)),
        );

        let err = discovery
            .discover_within(Duration::from_secs(12))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Cancelled(d) if d == Duration::from_secs(12)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_accepted_cleanup_still_removes_service() {
        // Eight calls at 10s each; the deadline lands while the delete of the
        // accepted Service is still in flight.
        let (api, discovery) = discovery(MockClusterApi::new().with_latency(Duration::from_secs(10)));

        let err = discovery
            .discover_within(Duration::from_secs(75))
            .await
            .unwrap_err();

        assert!(matches!(err, DiscoveryError::Cancelled(_)));
        assert_eq!(api.calls(MockCall::CreateService), 1);
        assert_eq!(api.calls(MockCall::DeleteService), 2);
        assert_eq!(api.service_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_not_reached() {
        let (_, discovery) = discovery(
            MockClusterApi::new()
                .with_service_cidr(SERVICE_CIDR_FROM_PROBE)
                .with_latency(Duration::from_millis(10)),
        );

        let network = discovery
            .discover_within(Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(network.service_cidrs, vec![SERVICE_CIDR_FROM_PROBE.to_string()]);
    }
}
