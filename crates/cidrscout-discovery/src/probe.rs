//! Service CIDR discovery by provoking the IP allocator.
//!
//! No read-only API exposes the configured Service range. The API server's
//! IP allocator does name it, though, when it rejects a Service whose cluster
//! IP lies outside it. This module builds such a Service, submits it and reads
//! the range back out of the rejection message.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

use cidrscout_core::validate_cidr_list;

use crate::k8s::ClusterApi;
use crate::{DiscoveryConfig, DiscoveryError, Result};

/// Cluster IP requested by the probe. It is expected to lie outside every
/// real Service range.
pub const PROBE_CLUSTER_IP: &str = "1.1.1.1";

/// Port exposed by the probe Service.
pub const PROBE_PORT: i32 = 443;

/// Phrase that precedes the range in the allocator's rejection.
const VALID_RANGE_MARKER: &str = "valid IPs is ";

/// HTTP status of a validation rejection (`Invalid`).
const STATUS_UNPROCESSABLE: u16 = 422;

/// Build the probe Service for the configured namespace.
#[must_use]
pub fn build_probe_service(config: &DiscoveryConfig) -> Service {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/managed-by".to_string(), "cidrscout".to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(config.probe_service_name.clone()),
            namespace: Some(config.probe_namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(PROBE_CLUSTER_IP.to_string()),
            ports: Some(vec![ServicePort {
                port: PROBE_PORT,
                target_port: Some(IntOrString::Int(PROBE_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Discover the Service CIDR by creating the probe Service and parsing the
/// allocator's rejection. A rejection that ends in the marker but names no
/// range yields `Ok(None)`.
///
/// # Errors
///
/// - [`DiscoveryError::ProbeAccepted`] if the Service was created. The probe is
///   deleted again before returning.
/// - [`DiscoveryError::UnparsableEvidence`] if the rejection lacks the marker
///   or the text after it is not a CIDR list.
/// - [`DiscoveryError::Query`] if the create call failed for another reason.
pub async fn find_service_cidr_from_probe<A>(
    api: &A,
    config: &DiscoveryConfig,
) -> Result<Option<String>>
where
    A: ClusterApi + ?Sized,
{
    let namespace = config.probe_namespace.as_str();
    let name = config.probe_service_name.as_str();
    let service = build_probe_service(config);

    match api.create_service(namespace, &service).await {
        Ok(_) => {
            warn!(
                namespace,
                name,
                cluster_ip = PROBE_CLUSTER_IP,
                "Probe Service was accepted, removing it"
            );
            if let Err(e) = api.delete_service(namespace, name).await {
                error!(namespace, name, error = %e, "Failed to remove accepted probe Service");
            }
            Err(DiscoveryError::ProbeAccepted {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        }
        Err(kube::Error::Api(rejection)) if rejection.code == STATUS_UNPROCESSABLE => {
            debug!(namespace, message = %rejection.message, "Probe Service rejected");
            parse_service_cidr_from(&rejection.message)
        }
        Err(e) => Err(DiscoveryError::query(
            format!("error creating probe Service in namespace {namespace:?}"),
            e,
        )),
    }
}

/// Extract the Service CIDR from an allocator rejection message.
///
/// The last line of the message must contain `valid IPs is ` and end with the
/// range, e.g. `... The range of valid IPs is 10.45.0.0/16`. Anything after
/// the final marker is taken as the range and must parse as a CIDR list.
/// A marker with nothing after it names no range and yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`DiscoveryError::UnparsableEvidence`] carrying `message` verbatim
/// if the marker is missing or the text after it is not a CIDR list.
pub fn parse_service_cidr_from(message: &str) -> Result<Option<String>> {
    let unparsable = || DiscoveryError::UnparsableEvidence {
        message: message.to_string(),
    };

    let last_line = message.rsplit('\n').next().unwrap_or(message);
    let (_, range) = last_line.rsplit_once(VALID_RANGE_MARKER).ok_or_else(unparsable)?;
    let range = range.trim();
    if range.is_empty() {
        debug!("Probe rejection names no Service range");
        return Ok(None);
    }

    validate_cidr_list(range).map_err(|_| unparsable())?;
    Ok(Some(range.to_string()))
}
