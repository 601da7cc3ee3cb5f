//! Metrics-exporter scenarios against a live cluster
//!
//! Every scenario snapshots the NetworkConfig resources before mutating and
//! restores them before returning, pass or fail. All tests require a cluster
//! running the NetworkConfig operator with RDMA-capable workload pods, so
//! they are ignored by default:
//!
//! ```bash
//! cargo test --test metrics_exporter_test -- --ignored --test-threads=1
//! ```

use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use verkko::context::{config_for_pod, split_configs, PatchIntent};
use verkko::metrics::text_has_sample;
use verkko::scenario::{self, Scenario, ScenarioError};
use verkko::Context;

/// In-range replacement nodePorts for the update scenario
const VF_UPDATE_PORT: i32 = 32520;
const OTHER_UPDATE_PORT: i32 = 32521;

/// NodePort outside the default 30000-32767 service range
const OUT_OF_RANGE_PORT: i32 = 32800;

/// Source port probed when serviceType drops the node-port exposure
const SOURCE_PORT: i32 = 5001;

/// Custom exporter port for the port-override scenario
const CUSTOM_SOURCE_PORT: i32 = 2001;

/// Readiness poll for freshly moved endpoints
const READY_TIMEOUT: Duration = Duration::from_secs(20);
const READY_INTERVAL: Duration = Duration::from_secs(1);

/// Grace for the operator to reconcile a spec change
const SETTLE: Duration = Duration::from_secs(2);

async fn harness() -> Context {
    verkko::telemetry::init_logging();
    Context::new().await.expect("Should create context")
}

/// A skipped scenario passes with a notice, like a skipped pytest
fn allow_skip(result: Result<(), ScenarioError>) -> Result<(), ScenarioError> {
    match result {
        Err(ScenarioError::Skipped(reason)) => {
            eprintln!("scenario skipped: {reason}");
            Ok(())
        }
        other => other,
    }
}

#[tokio::test]
#[ignore] // Requires real cluster
async fn test_all_pods_running() {
    let ctx = harness().await;

    // Report-only sweep: offenders are named for the test log, the scenarios
    // decide for themselves whether the cluster is usable.
    let offenders = ctx.pods_not_running().await.expect("Should list pods");
    for (namespace, name, phase) in &offenders {
        eprintln!("pod not running: {namespace}/{name} phase={phase}");
    }
}

#[tokio::test]
#[ignore] // Requires real cluster with the NetworkConfig operator
async fn test_traffic_and_pull_metrics() {
    let ctx = harness().await;

    let configs = match ctx.list_configs().await {
        Ok(configs) => configs,
        Err(e) => {
            eprintln!("scenario skipped: could not list NetworkConfig resources: {e}");
            return;
        }
    };
    if configs.is_empty() {
        eprintln!("scenario skipped: no NetworkConfig objects found");
        return;
    }

    let ports = ctx
        .node_ports_by_config()
        .await
        .expect("Should read nodePorts");
    assert_eq!(
        ports.len(),
        configs.len(),
        "every NetworkConfig must carry spec.metricsExporter.nodePort"
    );

    let pods = ctx.list_workloads().await.expect("Should list workloads");
    if pods.is_empty() {
        eprintln!("scenario skipped: no running workload pods");
        return;
    }

    let names: Vec<String> = pods.iter().map(|p| p.name.clone()).collect();
    ctx.exercise_traffic(&names).await;

    let bindings = ctx.bind_pods(&pods, &ports).await;
    assert!(
        bindings.skipped.is_empty(),
        "pods without a usable endpoint: {:?}",
        bindings.skipped
    );

    let mut missing = Vec::new();
    for (pod, _config, binding) in &bindings.bound {
        match ctx.pull_metrics(&pod.name, binding).await {
            Ok(text) if text_has_sample(&text) => {}
            Ok(_) => missing.push((
                pod.name.clone(),
                format!(
                    "no numeric lines from {}:{}",
                    binding.node_address, binding.port
                ),
            )),
            Err(e) => missing.push((pod.name.clone(), e.to_string())),
        }
    }
    assert!(missing.is_empty(), "metrics missing/invalid: {missing:?}");
}

#[tokio::test]
#[ignore] // Requires real cluster with the NetworkConfig operator
async fn test_update_nodeport_and_verify_metrics_pull() {
    let ctx = harness().await;

    let result = scenario::run(&ctx, "update-nodeport", |s| {
        Box::pin(async move {
            let modified: BTreeMap<String, i32> = s
                .config_names()
                .into_iter()
                .map(|name| {
                    let port = if name.starts_with("vf-") {
                        VF_UPDATE_PORT
                    } else {
                        OTHER_UPDATE_PORT
                    };
                    (name, port)
                })
                .collect();

            let intents: Vec<PatchIntent> = modified
                .iter()
                .map(|(name, port)| {
                    PatchIntent::new(
                        name.clone(),
                        json!({ "spec": { "metricsExporter": { "nodePort": port } } }),
                    )
                })
                .collect();
            scenario::require_applied(&s.mutate(intents).await)?;

            let pods = s
                .context()
                .list_workloads()
                .await
                .map_err(|e| ScenarioError::SetupFailed(e.to_string()))?;
            if pods.is_empty() {
                return Err(ScenarioError::Skipped(
                    "no running workload pods".to_string(),
                ));
            }

            let bindings = s.bind_pods(&pods, &modified).await;

            // Wait on one representative endpoint per config before the full
            // pull round; a slow endpoint is a warning, the pull decides.
            let mut seen = BTreeSet::new();
            for (pod, config, binding) in &bindings.bound {
                if seen.insert(config.clone())
                    && !s
                        .context()
                        .wait_metrics_ready(&pod.name, binding, READY_TIMEOUT, READY_INTERVAL)
                        .await
                {
                    eprintln!(
                        "metrics not ready for {config} on {}:{}",
                        binding.node_address, binding.port
                    );
                }
            }

            s.exercise_traffic(&pods).await;

            let mut missing = Vec::new();
            for (pod, _config, binding) in &bindings.bound {
                match s.context().pull_metrics(&pod.name, binding).await {
                    Ok(text) if text_has_sample(&text) => {}
                    Ok(_) => missing.push((
                        pod.name.clone(),
                        format!(
                            "no numeric lines from {}:{}",
                            binding.node_address, binding.port
                        ),
                    )),
                    Err(e) => missing.push((pod.name.clone(), e.to_string())),
                }
            }
            if !missing.is_empty() {
                return Err(ScenarioError::MetricsMissing(missing));
            }
            Ok(())
        })
    })
    .await;

    allow_skip(result).expect("Scenario should pass");
}

#[tokio::test]
#[ignore] // Requires real cluster with the NetworkConfig operator
async fn test_disable_metrics_exporter_and_verify_no_metrics() {
    let ctx = harness().await;

    let result = scenario::run(&ctx, "disable-exporter", |s| {
        Box::pin(async move {
            let ports = s.snapshot_node_ports();

            let outcome = s
                .mutate_all(&json!({ "spec": { "metricsExporter": { "enable": false } } }))
                .await;
            scenario::require_applied(&outcome)?;

            tokio::time::sleep(SETTLE).await;

            let pods = s
                .context()
                .list_workloads()
                .await
                .map_err(|e| ScenarioError::SetupFailed(e.to_string()))?;
            if pods.is_empty() {
                return Err(ScenarioError::Skipped(
                    "no running workload pods".to_string(),
                ));
            }

            s.exercise_traffic(&pods).await;

            let bindings = s.bind_pods(&pods, &ports).await;
            let mut unexpected = Vec::new();
            for (pod, _config, binding) in &bindings.bound {
                if s.context().metrics_have_sample(&pod.name, binding).await {
                    unexpected.push((
                        pod.name.clone(),
                        format!("{}:{}", binding.node_address, binding.port),
                    ));
                }
            }
            if !unexpected.is_empty() {
                return Err(ScenarioError::UnexpectedMetrics(unexpected));
            }
            Ok(())
        })
    })
    .await;

    allow_skip(result).expect("Scenario should pass");
}

#[tokio::test]
#[ignore] // Requires real cluster with the NetworkConfig operator
async fn test_out_of_range_nodeport_is_rejected() {
    let ctx = harness().await;

    let result = scenario::run(&ctx, "out-of-range-nodeport", |s| {
        Box::pin(async move {
            let before = s.snapshot_node_ports();

            let outcome = s
                .mutate_all(
                    &json!({ "spec": { "metricsExporter": { "nodePort": OUT_OF_RANGE_PORT } } }),
                )
                .await;
            scenario::require_all_rejected(&outcome)?;

            Ok(before)
        })
    })
    .await;

    let before = match result {
        Err(ScenarioError::Skipped(reason)) => {
            eprintln!("scenario skipped: {reason}");
            return;
        }
        other => other.expect("Out-of-range nodePort must be rejected everywhere"),
    };

    // The restore ran inside the scenario; the live values must equal the
    // pre-test ones.
    let after = ctx
        .node_ports_by_config()
        .await
        .expect("Should read nodePorts");
    assert_eq!(before, after, "nodePort values changed across the scenario");
}

/// Probe each pod against the nodePort value recorded in its config
///
/// With serviceType=ClusterIP the recorded value must not serve metrics on
/// `target_port` from inside the pods.
async fn probe_recorded_values(s: &Scenario, target_port: i32) -> Result<(), ScenarioError> {
    let recorded = s.snapshot_node_port_values();

    let pods = s
        .context()
        .list_workloads()
        .await
        .map_err(|e| ScenarioError::SetupFailed(e.to_string()))?;
    if pods.is_empty() {
        return Err(ScenarioError::Skipped(
            "no running workload pods".to_string(),
        ));
    }

    s.exercise_traffic(&pods).await;

    let names: Vec<String> = recorded.keys().cloned().collect();
    let (vf_configs, other_configs) = split_configs(&names);

    let mut unexpected = Vec::new();
    let mut probed = 0usize;
    for pod in &pods {
        let Some(config) = config_for_pod(&pod.name, &vf_configs, &other_configs) else {
            eprintln!("no NetworkConfig mapping for pod {}; skipping", pod.name);
            continue;
        };
        let candidate = recorded.get(config).cloned().unwrap_or_default();
        if candidate.is_empty() {
            eprintln!("config {config} has no recorded nodePort value; skipping pod {}", pod.name);
            continue;
        }

        probed += 1;
        if let Some(text) = s
            .context()
            .fetch_metrics_with_backoff(&pod.name, &candidate, target_port, 5, SETTLE)
            .await
        {
            if text_has_sample(&text) {
                unexpected.push((pod.name.clone(), format!("{candidate}:{target_port}")));
            }
        }
    }

    if !unexpected.is_empty() {
        return Err(ScenarioError::UnexpectedMetrics(unexpected));
    }
    if probed == 0 {
        return Err(ScenarioError::Skipped(
            "no recorded nodePort values to probe".to_string(),
        ));
    }
    Ok(())
}

#[tokio::test]
#[ignore] // Requires real cluster with the NetworkConfig operator
async fn test_cluster_ip_service_type_disables_node_port() {
    let ctx = harness().await;

    let result = scenario::run(&ctx, "cluster-ip-service-type", |s| {
        Box::pin(async move {
            let outcome = s
                .mutate_all(&json!({ "spec": { "serviceType": "ClusterIP" } }))
                .await;
            scenario::require_applied(&outcome)?;

            probe_recorded_values(s, SOURCE_PORT).await
        })
    })
    .await;

    allow_skip(result).expect("Scenario should pass");
}

#[tokio::test]
#[ignore] // Requires real cluster with the NetworkConfig operator
async fn test_custom_source_port_with_cluster_ip() {
    let ctx = harness().await;

    let result = scenario::run(&ctx, "cluster-ip-custom-port", |s| {
        Box::pin(async move {
            let outcome = s
                .mutate_all(&json!({
                    "spec": {
                        "serviceType": "ClusterIP",
                        "metricsExporter": { "port": CUSTOM_SOURCE_PORT }
                    }
                }))
                .await;
            scenario::require_applied(&outcome)?;

            probe_recorded_values(s, CUSTOM_SOURCE_PORT).await
        })
    })
    .await;

    allow_skip(result).expect("Scenario should pass");
}
