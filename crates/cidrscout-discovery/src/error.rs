//! Error types for the discovery crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during network discovery.
///
/// Absence of evidence is never an error: a missing flag, an empty node
/// field or an abstaining multi-node cluster all surface as `Ok(None)`.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// A cluster query failed while gathering evidence.
    #[error("{context}: {source}")]
    Query {
        /// What was being queried.
        context: String,
        /// The underlying API error.
        #[source]
        source: kube::Error,
    },

    /// The probe Service was accepted by the cluster instead of rejected.
    #[error(
        "could not determine the service IP range via service creation - expected a specific \
         error but none was returned (probe Service {namespace}/{name} was accepted)"
    )]
    ProbeAccepted {
        /// Namespace the probe was created in.
        namespace: String,
        /// Name of the probe Service.
        name: String,
    },

    /// The probe rejection message did not carry a parsable Service CIDR.
    #[error(
        "could not determine the service IP range via service creation - the expected error \
         was not returned. The actual error was \"{message}\""
    )]
    UnparsableEvidence {
        /// The rejection message, verbatim.
        message: String,
    },

    /// The caller's deadline elapsed before discovery finished.
    #[error("network discovery cancelled after {0:?}")]
    Cancelled(Duration),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiscoveryError {
    /// Wrap a Kubernetes error with the query that produced it.
    pub(crate) fn query(context: impl Into<String>, source: kube::Error) -> Self {
        Self::Query {
            context: context.into(),
            source,
        }
    }

    /// Check if a later discovery pass could reasonably succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::KubeApi(_) | Self::Query { .. } | Self::Cancelled(_)
        )
    }
}

/// A specialized Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
