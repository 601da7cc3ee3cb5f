use super::types::PortBinding;
use super::{classify_kube_error, AccessError, Context};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Name prefix marking virtual-function workload pods
const VF_POD_PREFIX: &str = "vf-workload";

/// Name prefix marking virtual-function NetworkConfigs
const VF_CONFIG_PREFIX: &str = "vf-";

/// A Running workload pod and its scheduling placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadPod {
    /// Pod name
    pub name: String,
    /// Node the pod is scheduled on, when known
    pub node_name: Option<String>,
}

/// Pods paired with the endpoint each one observes
#[derive(Debug, Default)]
pub struct PodBindings {
    /// Pod, governing config name, and where to pull metrics from
    pub bound: Vec<(WorkloadPod, String, PortBinding)>,
    /// Pod name -> reason it was left out of the round
    pub skipped: Vec<(String, String)>,
}

/// Split config names into vf- and non-vf- groups, preserving order
#[must_use]
pub fn split_configs(names: &[String]) -> (Vec<String>, Vec<String>) {
    names
        .iter()
        .cloned()
        .partition(|n| n.starts_with(VF_CONFIG_PREFIX))
}

/// Pick the NetworkConfig governing a pod, by the vf- naming rule
///
/// Pods named `vf-workload*` pair with the first `vf-` config; every other
/// pod pairs with the first non-`vf-` config. `None` means the pod has no
/// counterpart among the discovered configs - callers skip it with a
/// warning rather than treating it as success.
#[must_use]
pub fn config_for_pod<'a>(
    pod_name: &str,
    vf_configs: &'a [String],
    other_configs: &'a [String],
) -> Option<&'a str> {
    if pod_name.starts_with(VF_POD_PREFIX) {
        vf_configs.first().map(String::as_str)
    } else {
        other_configs.first().map(String::as_str)
    }
}

impl Context {
    /// List Running workload pods in the workload namespace
    pub async fn list_workloads(&self) -> Result<Vec<WorkloadPod>, AccessError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.settings.workload_namespace);

        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(&e, "list workload pods"))?;

        let running: Vec<WorkloadPod> = list
            .items
            .into_iter()
            .filter(|p| {
                p.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == "Running")
            })
            .filter_map(|p| {
                let node_name = p.spec.as_ref().and_then(|s| s.node_name.clone());
                p.metadata.name.map(|name| WorkloadPod { name, node_name })
            })
            .collect();

        info!(
            namespace = %self.settings.workload_namespace,
            count = running.len(),
            "Found running workload pods"
        );

        Ok(running)
    }

    /// Sweep all namespaces for pods that are not Running
    ///
    /// Returns `(namespace, name, phase)` for each offender; an empty list
    /// means the cluster is healthy enough to run scenarios against.
    pub async fn pods_not_running(&self) -> Result<Vec<(String, String, String)>, AccessError> {
        let pods: Api<Pod> = Api::all(self.client.clone());

        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(&e, "list pods in all namespaces"))?;

        let mut offenders = Vec::new();
        for pod in list.items {
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            // Completed one-shot pods are not a health problem
            if phase == "Running" || phase == "Succeeded" {
                continue;
            }
            let namespace = pod.metadata.namespace.clone().unwrap_or_default();
            let name = pod.metadata.name.clone().unwrap_or_default();
            warn!(namespace = %namespace, pod = %name, phase = %phase, "Pod not running");
            offenders.push((namespace, name, phase));
        }

        Ok(offenders)
    }

    /// Pair each pod with its governing config and a metrics endpoint
    ///
    /// Applies the vf-/non-vf rule over the configs named in
    /// `port_by_config`, then resolves each pod's node address. Pods with no
    /// matching config, no recorded port, no nodeName or an unresolvable
    /// node land in `skipped` with a reason - they are reported, not
    /// silently dropped; each scenario decides whether a skip is fatal.
    pub async fn bind_pods(
        &self,
        pods: &[WorkloadPod],
        port_by_config: &BTreeMap<String, i32>,
    ) -> PodBindings {
        let config_names: Vec<String> = port_by_config.keys().cloned().collect();
        let (vf_configs, other_configs) = split_configs(&config_names);

        let mut bindings = PodBindings::default();
        for pod in pods {
            let Some(config) = config_for_pod(&pod.name, &vf_configs, &other_configs) else {
                warn!(pod = %pod.name, "No NetworkConfig matching rule for pod; skipping");
                bindings
                    .skipped
                    .push((pod.name.clone(), "no-matching-config".to_string()));
                continue;
            };
            let Some(port) = port_by_config.get(config).copied() else {
                bindings
                    .skipped
                    .push((pod.name.clone(), format!("no-port-for-config {config}")));
                continue;
            };
            let Some(node_name) = pod.node_name.as_deref() else {
                warn!(pod = %pod.name, "Pod has no nodeName; skipping");
                bindings
                    .skipped
                    .push((pod.name.clone(), "no-nodeName".to_string()));
                continue;
            };
            let Some(node_address) = self.node_internal_ip(node_name).await else {
                bindings.skipped.push((
                    pod.name.clone(),
                    format!("no-node-address node={node_name}"),
                ));
                continue;
            };

            bindings.bound.push((
                pod.clone(),
                config.to_string(),
                PortBinding {
                    node_address,
                    port,
                    service_name: self.settings.metrics_service_name.clone(),
                },
            ));
        }

        bindings
    }
}
