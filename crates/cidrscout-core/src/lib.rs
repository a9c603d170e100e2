//! Core network types for cidrscout.
//!
//! This crate provides the types shared by the discovery engine and its consumers:
//!
//! - **Cluster network**: the [`ClusterNetwork`] discovery result and the
//!   [`NetworkPlugin`] tag identifying which discovery variant produced it
//! - **CIDR helpers**: validation of CIDR literals pulled out of cluster evidence
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use cidrscout_core::{ClusterNetwork, NetworkPlugin};
//!
//! let network = ClusterNetwork::new(NetworkPlugin::Generic)
//!     .with_pod_cidr("10.244.0.0/16")
//!     .with_service_cidr("10.96.0.0/12");
//!
//! assert!(network.is_complete());
//! println!("{network}");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cidr;
pub mod error;
pub mod network;

pub use cidr::{validate_cidr, validate_cidr_list};
pub use error::{CoreError, Result};
pub use network::{ClusterNetwork, NetworkPlugin};
