//! Configuration for the discovery engine.

use std::time::Duration;

use tracing::warn;

use crate::{DiscoveryError, Result};

/// Namespace used for the probe Service when `WATCH_NAMESPACE` is not set.
pub const DEFAULT_PROBE_NAMESPACE: &str = "default";

/// Default name of the probe Service.
pub const DEFAULT_PROBE_SERVICE_NAME: &str = "invalid-svc";

/// Default name of the cluster-scoped `ClusterMeshConfig` object.
pub const DEFAULT_MESH_CONFIG_NAME: &str = "cluster-mesh";

/// Configuration for a discovery pass.
///
/// Resolved once by the caller and threaded through every step, so a pass
/// never reads the environment halfway through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Namespace the probe Service is created in.
    pub probe_namespace: String,
    /// Name given to the probe Service.
    pub probe_service_name: String,
    /// Name of the `ClusterMeshConfig` object holding configured ranges.
    pub mesh_config_name: String,
    /// Optional deadline for a whole pass.
    pub timeout: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_namespace: DEFAULT_PROBE_NAMESPACE.to_string(),
            probe_service_name: DEFAULT_PROBE_SERVICE_NAME.to_string(),
            mesh_config_name: DEFAULT_MESH_CONFIG_NAME.to_string(),
            timeout: None,
        }
    }
}

impl DiscoveryConfig {
    /// Create a config that probes in the given namespace.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            probe_namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `WATCH_NAMESPACE`: namespace for the probe Service (the controller's own
    ///   namespace when running in-cluster)
    /// - `CIDRSCOUT_PROBE_SERVICE_NAME`: name of the probe Service
    /// - `CIDRSCOUT_CONFIG_NAME`: name of the `ClusterMeshConfig` object
    /// - `CIDRSCOUT_DISCOVERY_TIMEOUT_SECS`: deadline for a discovery pass
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(val) = get("WATCH_NAMESPACE") {
            config.probe_namespace = val;
        }
        if let Some(val) = get("CIDRSCOUT_PROBE_SERVICE_NAME") {
            config.probe_service_name = val;
        }
        if let Some(val) = get("CIDRSCOUT_CONFIG_NAME") {
            config.mesh_config_name = val;
        }
        if let Some(val) = get("CIDRSCOUT_DISCOVERY_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => config.timeout = Some(Duration::from_secs(secs)),
                Err(e) => warn!(
                    value = %val,
                    error = %e,
                    "Ignoring unparsable CIDRSCOUT_DISCOVERY_TIMEOUT_SECS"
                ),
            }
        }

        config
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is empty or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.probe_namespace.is_empty() {
            return Err(DiscoveryError::Config(
                "probe namespace must not be empty".to_string(),
            ));
        }
        if self.probe_service_name.is_empty() {
            return Err(DiscoveryError::Config(
                "probe service name must not be empty".to_string(),
            ));
        }
        if self.mesh_config_name.is_empty() {
            return Err(DiscoveryError::Config(
                "mesh config name must not be empty".to_string(),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(DiscoveryError::Config(
                "discovery timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
