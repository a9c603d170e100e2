//! The cluster-scoped mesh configuration resource.
//!
//! When an operator has already been configured with the cluster's global and
//! clusterset ranges, those values are copied as-is into the discovery result
//! instead of being inferred.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Mesh-wide addressing configured for this cluster.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cidrscout.io",
    version = "v1alpha1",
    kind = "ClusterMeshConfig",
    plural = "clustermeshconfigs",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMeshConfigSpec {
    /// Global CIDR handed to this cluster when cluster ranges overlap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_cidr: Option<String>,

    /// Range used for clusterset-wide virtual IPs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusterset_ip_cidr: Option<String>,
}

impl ClusterMeshConfigSpec {
    /// The configured global CIDR, ignoring empty strings.
    #[must_use]
    pub fn global_cidr(&self) -> Option<&str> {
        self.global_cidr.as_deref().filter(|s| !s.is_empty())
    }

    /// The configured clusterset IP CIDR, ignoring empty strings.
    #[must_use]
    pub fn clusterset_ip_cidr(&self) -> Option<&str> {
        self.clusterset_ip_cidr.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn crd_is_cluster_scoped() {
        let crd = ClusterMeshConfig::crd();
        assert_eq!(crd.spec.group, "cidrscout.io");
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.names.kind, "ClusterMeshConfig");
    }

    #[test]
    fn spec_deserializes_camel_case() {
        let spec: ClusterMeshConfigSpec = serde_json::from_value(serde_json::json!({
            "globalCidr": "242.112.0.0/24",
            "clustersetIpCidr": "243.110.0.0/20",
        }))
        .unwrap();
        assert_eq!(spec.global_cidr(), Some("242.112.0.0/24"));
        assert_eq!(spec.clusterset_ip_cidr(), Some("243.110.0.0/20"));
    }

    #[test]
    fn empty_fields_are_absent() {
        let spec = ClusterMeshConfigSpec {
            global_cidr: Some(String::new()),
            clusterset_ip_cidr: None,
        };
        assert!(spec.global_cidr().is_none());
        assert!(spec.clusterset_ip_cidr().is_none());
    }
}
