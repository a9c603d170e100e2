//! Pod CIDR from node specs.

use k8s_openapi::api::core::v1::Node;
use tracing::debug;

use crate::k8s::ClusterApi;
use crate::Result;

/// Read the Pod CIDR from the node list, if the cluster has exactly one node.
///
/// # Errors
///
/// Returns an error if listing nodes fails.
pub async fn find_pod_cidr_from_node_spec<A>(api: &A) -> Result<Option<String>>
where
    A: ClusterApi + ?Sized,
{
    let nodes = api.list_nodes().await?;
    let cidr = single_node_pod_cidr(&nodes);

    debug!(nodes = nodes.len(), found = cidr.is_some(), "Inspected node specs");
    Ok(cidr)
}

/// The Pod CIDR of the only node, or `None`.
///
/// Each node holds its own slice of the cluster range, so a node's field only
/// describes the whole cluster when there is a single node. With zero or
/// several nodes this abstains.
#[must_use]
pub fn single_node_pod_cidr(nodes: &[Node]) -> Option<String> {
    let [node] = nodes else {
        return None;
    };

    let spec = node.spec.as_ref()?;
    spec.pod_cidr
        .as_deref()
        .filter(|c| !c.is_empty())
        .or_else(|| {
            spec.pod_cidrs
                .as_ref()
                .and_then(|cidrs| cidrs.first())
                .map(String::as_str)
                .filter(|c| !c.is_empty())
        })
        .map(ToString::to_string)
}
