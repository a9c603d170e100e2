//! The cluster network discovery result.
//!
//! A [`ClusterNetwork`] is built once per discovery pass, handed to the
//! configuration layer and then dropped. It is never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::CoreError;

/// Tag identifying which network-plugin-specific discovery variant produced
/// a [`ClusterNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NetworkPlugin {
    /// Plugin-agnostic discovery from control-plane flags, nodes and the
    /// Service allocator.
    #[default]
    #[serde(rename = "generic")]
    Generic,
    /// Calico.
    #[serde(rename = "calico")]
    Calico,
    /// Flannel running under Canal.
    #[serde(rename = "canal-flannel")]
    CanalFlannel,
    /// kindnet, the plugin shipped with kind clusters.
    #[serde(rename = "kindnet")]
    Kindnet,
    /// OVN-Kubernetes.
    #[serde(rename = "OVNKubernetes")]
    OvnKubernetes,
    /// `OpenShift` SDN.
    #[serde(rename = "OpenShiftSDN")]
    OpenShiftSdn,
    /// Weave Net.
    #[serde(rename = "weave-net")]
    WeaveNet,
}

impl NetworkPlugin {
    /// Return the canonical tag string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Calico => "calico",
            Self::CanalFlannel => "canal-flannel",
            Self::Kindnet => "kindnet",
            Self::OvnKubernetes => "OVNKubernetes",
            Self::OpenShiftSdn => "OpenShiftSDN",
            Self::WeaveNet => "weave-net",
        }
    }
}

impl fmt::Display for NetworkPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkPlugin {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(Self::Generic),
            "calico" => Ok(Self::Calico),
            "canal-flannel" => Ok(Self::CanalFlannel),
            "kindnet" => Ok(Self::Kindnet),
            "OVNKubernetes" => Ok(Self::OvnKubernetes),
            "OpenShiftSDN" => Ok(Self::OpenShiftSdn),
            "weave-net" => Ok(Self::WeaveNet),
            other => Err(CoreError::UnknownNetworkPlugin(other.to_string())),
        }
    }
}

/// The discovered network addressing of a cluster.
///
/// `pod_cidrs` and `service_cidrs` hold zero or one entry in practice.
/// `global_cidr` and `clusterset_ip_cidr` are copied straight from the
/// cluster's mesh configuration object when one exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    /// Which discovery variant produced this result.
    pub network_plugin: NetworkPlugin,
    /// Pod IP ranges.
    #[serde(default)]
    pub pod_cidrs: Vec<String>,
    /// Service IP ranges.
    #[serde(default)]
    pub service_cidrs: Vec<String>,
    /// Global CIDR assigned to this cluster for overlapping-range support.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_cidr: Option<String>,
    /// Range used for clusterset-wide virtual IPs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusterset_ip_cidr: Option<String>,
}

impl ClusterNetwork {
    /// Create an empty result tagged with the given plugin.
    #[must_use]
    pub fn new(network_plugin: NetworkPlugin) -> Self {
        Self {
            network_plugin,
            ..Default::default()
        }
    }

    /// Add a Pod CIDR.
    #[must_use]
    pub fn with_pod_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.pod_cidrs.push(cidr.into());
        self
    }

    /// Add a Service CIDR.
    #[must_use]
    pub fn with_service_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.service_cidrs.push(cidr.into());
        self
    }

    /// Whether the inference chains found anything.
    #[must_use]
    pub fn has_inferred_ranges(&self) -> bool {
        !self.pod_cidrs.is_empty() || !self.service_cidrs.is_empty()
    }

    /// Whether the mesh configuration object supplied any field.
    #[must_use]
    pub fn has_configured_ranges(&self) -> bool {
        self.global_cidr.is_some() || self.clusterset_ip_cidr.is_some()
    }

    /// Whether there is anything worth handing to the configuration layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_inferred_ranges() && !self.has_configured_ranges()
    }

    /// Whether both the Pod and Service ranges are known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.pod_cidrs.is_empty() && !self.service_cidrs.is_empty()
    }

    /// Emit the discovered values as a single structured log event.
    pub fn log(&self) {
        info!(
            network_plugin = %self.network_plugin,
            pod_cidrs = ?self.pod_cidrs,
            service_cidrs = ?self.service_cidrs,
            global_cidr = ?self.global_cidr,
            clusterset_ip_cidr = ?self.clusterset_ip_cidr,
            "Discovered cluster network"
        );
    }
}

impl fmt::Display for ClusterNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Discovered network details:")?;
        writeln!(f, "    Network plugin:  {}", self.network_plugin)?;
        writeln!(f, "    Service CIDRs:   {:?}", self.service_cidrs)?;
        write!(f, "    Cluster CIDRs:   {:?}", self.pod_cidrs)?;
        if let Some(global) = &self.global_cidr {
            write!(f, "\n    Global CIDR:     {global}")?;
        }
        if let Some(clusterset) = &self.clusterset_ip_cidr {
            write!(f, "\n    ClustersetIP CIDR: {clusterset}")?;
        }
        Ok(())
    }
}
