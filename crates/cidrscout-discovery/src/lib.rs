//! Plugin-agnostic discovery of a cluster's Pod and Service CIDRs.
//!
//! This crate provides [`NetworkDiscovery`], which inspects a running
//! Kubernetes cluster through the [`ClusterApi`] trait and reports the address
//! ranges it uses. It handles:
//!
//! - Reading `--cluster-cidr` and `--service-cluster-ip-range` from
//!   control-plane pod command lines
//! - Reading the Pod CIDR from the node spec of a single-node cluster
//! - Provoking the API server's IP allocator to name the Service range
//! - Copying globally configured ranges from a `ClusterMeshConfig` object
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      NetworkDiscovery                           │
//! │                                                                 │
//! │   ClusterMeshConfig ──► globalCIDR / clustersetIPCIDR           │
//! │                                                                 │
//! │   Pod CIDR chain                 Service CIDR chain             │
//! │  ┌─────────────────────────┐    ┌─────────────────────────┐    │
//! │  │ kube-controller-manager │    │ kube-apiserver          │    │
//! │  │ kube-proxy              │    │ kube-controller-manager │    │
//! │  │ single node spec        │    │ Service creation probe  │    │
//! │  └─────────────────────────┘    └─────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 ClusterApi (KubeClusterApi)                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Kubernetes API Server                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each chain stops at the first source that yields a value. An error from
//! any source aborts the whole pass.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cidrscout_discovery::{DiscoveryConfig, KubeClusterApi, NetworkDiscovery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(KubeClusterApi::try_default().await?);
//! let discovery = NetworkDiscovery::new(api, DiscoveryConfig::from_env());
//!
//! if let Some(network) = discovery.discover().await? {
//!     println!("{network}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! For testing without a real Kubernetes cluster, enable the `test-utils` feature
//! and use the mock cluster:
//!
//! ```ignore
//! use std::sync::Arc;
//! use cidrscout_discovery::{DiscoveryConfig, MockClusterApi, NetworkDiscovery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(MockClusterApi::new().with_service_cidr("10.96.0.0/12"));
//! let discovery = NetworkDiscovery::new(api, DiscoveryConfig::default());
//!
//! let network = discovery.discover().await?.unwrap();
//! assert_eq!(network.service_cidrs, vec!["10.96.0.0/12".to_string()]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod chain;
pub mod config;
pub mod crd;
pub mod discovery;
pub mod error;
pub mod k8s;
pub mod nodes;
pub mod params;
pub mod probe;

pub use config::DiscoveryConfig;
pub use crd::{ClusterMeshConfig, ClusterMeshConfigSpec};
pub use discovery::NetworkDiscovery;
pub use error::{DiscoveryError, Result};
pub use k8s::{ClusterApi, KubeClusterApi};

#[cfg(any(test, feature = "test-utils"))]
pub use k8s::mock::MockClusterApi;
