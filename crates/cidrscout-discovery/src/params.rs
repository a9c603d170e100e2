//! Reading control-plane command-line flags from running pods.
//!
//! Control-plane components are usually started with their address ranges
//! on the command line (`--cluster-cidr`, `--service-cluster-ip-range`).
//! When those components run as pods, their container spec is readable and
//! the flag value can be lifted straight out of it.

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::k8s::ClusterApi;
use crate::Result;

/// Selector for the kube-controller-manager static pod.
pub const KUBE_CONTROLLER_MANAGER_SELECTOR: &str = "component=kube-controller-manager";
/// Selector for kube-proxy pods.
pub const KUBE_PROXY_SELECTOR: &str = "k8s-app=kube-proxy";
/// Selector for the kube-apiserver static pod.
pub const KUBE_APISERVER_SELECTOR: &str = "component=kube-apiserver";

/// Flag carrying the Pod CIDR.
pub const CLUSTER_CIDR_FLAG: &str = "--cluster-cidr";
/// Flag carrying the Service CIDR.
pub const SERVICE_CLUSTER_IP_RANGE_FLAG: &str = "--service-cluster-ip-range";

/// Find the value of `flag` on a pod matching `label_selector`.
///
/// When several pods match, the one with the smallest namespace/name pair is
/// inspected. Returns `Ok(None)` when no pod matches or the flag is absent.
///
/// # Errors
///
/// Returns an error if listing pods fails.
pub async fn find_pod_command_parameter<A>(
    api: &A,
    label_selector: &str,
    flag: &str,
) -> Result<Option<String>>
where
    A: ClusterApi + ?Sized,
{
    let pods = api.list_pods(label_selector).await?;

    let Some(pod) = select_pod(&pods) else {
        debug!(label_selector, "No pod matches selector");
        return Ok(None);
    };

    let value = command_parameter(pod, flag);
    debug!(
        label_selector,
        flag,
        pod = pod.metadata.name.as_deref().unwrap_or_default(),
        found = value.is_some(),
        "Inspected pod command line"
    );

    Ok(value)
}

/// Pick the pod to inspect: the smallest `(namespace, name)`.
#[must_use]
pub fn select_pod(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().min_by(|a, b| {
        let key = |p: &Pod| (p.metadata.namespace.clone(), p.metadata.name.clone());
        key(a).cmp(&key(b))
    })
}

/// Extract the value of `flag` from a pod's containers.
///
/// Each container's command and args are scanned as one sequence, in
/// container order.
#[must_use]
pub fn command_parameter(pod: &Pod, flag: &str) -> Option<String> {
    pod.spec.as_ref()?.containers.iter().find_map(|container| {
        let tokens = container
            .command
            .iter()
            .flatten()
            .chain(container.args.iter().flatten())
            .map(String::as_str);
        find_flag_value(tokens, flag)
    })
}

/// Find a flag's value in a token sequence.
///
/// Accepts `--flag=value` and `--flag value`. A token holding whitespace
/// (e.g. the script passed to `sh -c`) is split and searched as well.
/// Empty values count as absent.
#[must_use]
pub fn find_flag_value<'a, I>(tokens: I, flag: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        if token.contains(char::is_whitespace) {
            if let Some(value) = find_flag_value(token.split_whitespace(), flag) {
                return Some(value);
            }
            continue;
        }

        let value = if token == flag {
            match tokens.peek() {
                Some(next) if !next.starts_with('-') => tokens.next(),
                _ => None,
            }
        } else {
            token
                .strip_prefix(flag)
                .and_then(|rest| rest.strip_prefix('='))
        };

        if let Some(value) = value.map(unquote).filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
    }

    None
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::mock::{forbidden, pod, MockCall, MockClusterApi};
    use crate::DiscoveryError;

    #[test]
    fn equals_form() {
        let tokens = ["kube-proxy", "--cluster-cidr=1.2.3.4/16", "--v=2"];
        assert_eq!(
            find_flag_value(tokens, CLUSTER_CIDR_FLAG),
            Some("1.2.3.4/16".to_string())
        );
    }

    #[test]
    fn separate_value_form() {
        let tokens = ["kube-proxy", "--cluster-cidr", "1.2.3.4/16"];
        assert_eq!(
            find_flag_value(tokens, CLUSTER_CIDR_FLAG),
            Some("1.2.3.4/16".to_string())
        );
    }

    #[test]
    fn flag_followed_by_another_flag_is_absent() {
        let tokens = ["kube-proxy", "--cluster-cidr", "--v=2"];
        assert_eq!(find_flag_value(tokens, CLUSTER_CIDR_FLAG), None);
    }

    #[test]
    fn similar_flag_names_do_not_match() {
        let tokens = ["kube-proxy", "--cluster-ABCD=1.2.3.4", "--cluster-cidr-extra=5.6.7.8/16"];
        assert_eq!(find_flag_value(tokens, CLUSTER_CIDR_FLAG), None);
    }

    #[test]
    fn shell_wrapped_command() {
        let tokens = [
            "/bin/sh",
            "-c",
            "exec kube-proxy --cluster-cidr='10.244.0.0/16' --hostname-override=${NODE_NAME}",
        ];
        assert_eq!(
            find_flag_value(tokens, CLUSTER_CIDR_FLAG),
            Some("10.244.0.0/16".to_string())
        );
    }

    #[test]
    fn empty_value_is_absent() {
        assert_eq!(find_flag_value(["--cluster-cidr="], CLUSTER_CIDR_FLAG), None);
    }

    #[test]
    fn dual_stack_value_kept_whole() {
        let tokens = ["--service-cluster-ip-range=10.96.0.0/12,fd00::/108"];
        assert_eq!(
            find_flag_value(tokens, SERVICE_CLUSTER_IP_RANGE_FLAG),
            Some("10.96.0.0/12,fd00::/108".to_string())
        );
    }

    #[test]
    fn command_and_args_are_one_sequence() {
        let p = pod(
            "kube-system",
            "kube-controller-manager",
            &[],
            &["kube-controller-manager", "--cluster-cidr"],
            &["1.2.3.4/16"],
        );
        assert_eq!(
            command_parameter(&p, CLUSTER_CIDR_FLAG),
            Some("1.2.3.4/16".to_string())
        );
    }

    #[test]
    fn select_pod_is_deterministic() {
        let pods = vec![
            pod("kube-system", "kube-proxy-b", &[], &[], &[]),
            pod("kube-system", "kube-proxy-a", &[], &[], &[]),
            pod("other", "kube-proxy-0", &[], &[], &[]),
        ];
        let chosen = select_pod(&pods).unwrap();
        assert_eq!(chosen.metadata.name.as_deref(), Some("kube-proxy-a"));
        assert!(select_pod(&[]).is_none());
    }

    #[tokio::test]
    async fn finds_flag_on_matching_pod() {
        let api = MockClusterApi::new().with_pod(pod(
            "kube-system",
            "kube-proxy-x",
            &[("k8s-app", "kube-proxy")],
            &["kube-proxy", "--cluster-cidr=1.2.3.4/16"],
            &[],
        ));

        let value = find_pod_command_parameter(&api, KUBE_PROXY_SELECTOR, CLUSTER_CIDR_FLAG)
            .await
            .unwrap();
        assert_eq!(value, Some("1.2.3.4/16".to_string()));
    }

    #[tokio::test]
    async fn no_matching_pod_is_absent() {
        let api = MockClusterApi::new();
        let value = find_pod_command_parameter(&api, KUBE_APISERVER_SELECTOR, SERVICE_CLUSTER_IP_RANGE_FLAG)
            .await
            .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn list_failure_propagates() {
        let api = MockClusterApi::new().failing(MockCall::ListPods, forbidden("pods is forbidden"));
        let err = find_pod_command_parameter(&api, KUBE_PROXY_SELECTOR, CLUSTER_CIDR_FLAG)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Query { .. }));
        assert!(err.to_string().contains("k8s-app=kube-proxy"));
    }
}
