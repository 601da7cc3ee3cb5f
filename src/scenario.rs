//! Scenario driver for mutation tests
//!
//! Every test follows the same state machine: snapshot the NetworkConfigs,
//! mutate them, exercise traffic in the workload pods, observe the metrics
//! endpoints, then restore the snapshots - restore runs unconditionally,
//! including on the skip and early-exit paths, so a scenario always leaves
//! the cluster in its pre-scenario state whether it passes or fails.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use verkko::scenario::{self, Scenario};
//!
//! let ctx = Context::new().await?;
//! scenario::run(&ctx, "disable-exporter", |s| Box::pin(async move {
//!     let outcome = s.mutate_all(&json!({
//!         "spec": { "metricsExporter": { "enable": false } }
//!     })).await;
//!     scenario::require_applied(&outcome)?;
//!     // exercise traffic, observe metrics ...
//!     Ok(())
//! })).await?;
//! ```

use crate::context::types::{MutationOutcome, PatchIntent, Snapshot};
use crate::context::workload::{PodBindings, WorkloadPod};
use crate::context::{AccessError, Context, NetworkConfigView};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Errors from scenario execution
///
/// Failures carry the specific resource names, pods and ports involved
/// rather than an aggregate boolean.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("mutation failed: {0:?}")]
    MutationFailed(BTreeMap<String, String>),

    #[error("expected rejection, but patches were accepted for: {0:?}")]
    UnexpectedAcceptance(Vec<String>),

    #[error("metrics missing or invalid: {0:?}")]
    MetricsMissing(Vec<(String, String)>),

    #[error("unexpected metrics served: {0:?}")]
    UnexpectedMetrics(Vec<(String, String)>),

    #[error("failed to restore original documents: {0:?}")]
    RestoreFailed(Vec<(String, String)>),

    #[error("skipped: {0}")]
    Skipped(String),
}

/// One running scenario: captured snapshots plus the steps over them
pub struct Scenario {
    context: Context,
    name: String,
    snapshots: Vec<Snapshot>,
}

impl Scenario {
    /// Snapshot every NetworkConfig and open the scenario
    ///
    /// An unreachable or empty config namespace is a skip, not a failure -
    /// except a missing resource definition, which is fatal to the whole
    /// run.
    pub async fn begin(ctx: &Context, name: &str) -> Result<Self, ScenarioError> {
        let snapshots = match ctx.snapshot_configs().await {
            Ok(snapshots) => snapshots,
            Err(e @ AccessError::SchemaNotFound(_)) => {
                return Err(ScenarioError::SetupFailed(e.to_string()))
            }
            Err(e) => {
                return Err(ScenarioError::Skipped(format!(
                    "could not list NetworkConfig resources: {e}"
                )))
            }
        };
        if snapshots.is_empty() {
            return Err(ScenarioError::Skipped(
                "no NetworkConfig objects found".to_string(),
            ));
        }

        println!("\n📋 Scenario: {name}");
        info!(
            scenario = %name,
            configs = snapshots.len(),
            "Scenario started; originals snapshotted"
        );

        Ok(Self {
            context: ctx.clone(),
            name: name.to_string(),
            snapshots,
        })
    }

    /// The harness context
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Snapshots captured at scenario start
    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Names of the snapshotted configs
    #[must_use]
    pub fn config_names(&self) -> Vec<String> {
        self.snapshots.iter().map(|s| s.name.clone()).collect()
    }

    /// Typed views of the snapshotted documents, by name
    #[must_use]
    pub fn snapshot_views(&self) -> BTreeMap<String, NetworkConfigView> {
        self.snapshots
            .iter()
            .filter_map(|s| {
                match NetworkConfigView::from_document(&s.document) {
                    Ok(view) => Some((s.name.clone(), view)),
                    Err(e) => {
                        warn!(name = %s.name, error = %e, "Snapshot does not decode; ignoring");
                        None
                    }
                }
            })
            .collect()
    }

    /// nodePort recorded in each snapshot, for configs that carry one
    #[must_use]
    pub fn snapshot_node_ports(&self) -> BTreeMap<String, i32> {
        self.snapshot_views()
            .into_iter()
            .filter_map(|(name, view)| {
                match view.spec.metrics_exporter.node_port {
                    Some(port) => Some((name, port)),
                    None => {
                        warn!(name = %name, "Snapshot has no spec.metricsExporter.nodePort");
                        None
                    }
                }
            })
            .collect()
    }

    /// Raw nodePort wire values as text, "" where absent
    ///
    /// Some scenarios probe the recorded value verbatim instead of
    /// interpreting it, so this keeps whatever the document says.
    #[must_use]
    pub fn snapshot_node_port_values(&self) -> BTreeMap<String, String> {
        self.snapshots
            .iter()
            .map(|s| {
                let raw = match s.document.pointer("/spec/metricsExporter/nodePort") {
                    Some(serde_json::Value::String(v)) => v.clone(),
                    Some(serde_json::Value::Number(v)) => v.to_string(),
                    _ => String::new(),
                };
                (s.name.clone(), raw)
            })
            .collect()
    }

    /// Apply one patch body to every snapshotted config, concurrently
    pub async fn mutate_all(&self, body: &serde_json::Value) -> MutationOutcome {
        let intents = self
            .snapshots
            .iter()
            .map(|s| PatchIntent::new(s.name.clone(), body.clone()))
            .collect();
        self.mutate(intents).await
    }

    /// Apply per-config patches, concurrently
    ///
    /// Partial failure is already rolled back by the orchestrator before
    /// this returns; inspect the outcome with [`require_applied`] or
    /// [`require_all_rejected`].
    pub async fn mutate(&self, intents: Vec<PatchIntent>) -> MutationOutcome {
        self.context.mutate_configs(intents, &self.snapshots).await
    }

    /// Run the traffic command in every given pod
    ///
    /// Individual pod failures are captured as `ERROR: ...` text in the
    /// returned map, never aborting the scenario.
    pub async fn exercise_traffic(&self, pods: &[WorkloadPod]) -> BTreeMap<String, String> {
        let names: Vec<String> = pods.iter().map(|p| p.name.clone()).collect();
        self.context.exercise_traffic(&names).await
    }

    /// Pair each pod with its governing config and a metrics endpoint
    ///
    /// See [`Context::bind_pods`] for the skip semantics.
    pub async fn bind_pods(
        &self,
        pods: &[WorkloadPod],
        port_by_config: &BTreeMap<String, i32>,
    ) -> PodBindings {
        self.context.bind_pods(pods, port_by_config).await
    }

    /// Restore every snapshotted config to its original document
    ///
    /// Always attempted for every snapshot regardless of earlier errors;
    /// returns per-resource failures instead of aborting midway.
    pub async fn restore(&self) -> Vec<(String, String)> {
        let mut errors = Vec::new();
        for snapshot in &self.snapshots {
            if let Err(e) = self
                .context
                .replace_with_retry(&snapshot.name, snapshot.document.clone())
                .await
            {
                error!(
                    scenario = %self.name,
                    name = %snapshot.name,
                    error = %e,
                    "Failed to restore original NetworkConfig"
                );
                errors.push((snapshot.name.clone(), e.to_string()));
            }
        }
        errors
    }
}

/// Run a scenario body with guaranteed restore
///
/// Snapshots, runs `body`, then restores - even when the body failed or
/// skipped. A body failure is reported over any restore failure (restore
/// errors are logged); a restore failure alone fails the scenario.
pub async fn run<T>(
    ctx: &Context,
    name: &str,
    body: impl for<'a> FnOnce(&'a Scenario) -> BoxFuture<'a, Result<T, ScenarioError>>,
) -> Result<T, ScenarioError> {
    let scenario = Scenario::begin(ctx, name).await?;
    let outcome = body(&scenario).await;
    let restore_errors = scenario.restore().await;

    match outcome {
        Ok(value) => {
            if restore_errors.is_empty() {
                println!("   ✅ Scenario passed\n");
                Ok(value)
            } else {
                Err(ScenarioError::RestoreFailed(restore_errors))
            }
        }
        Err(e) => {
            if !restore_errors.is_empty() {
                error!(
                    scenario = %name,
                    restore_errors = ?restore_errors,
                    "Restore errors while scenario was already failing"
                );
            }
            Err(e)
        }
    }
}

/// Fail unless every patch in the round was applied
pub fn require_applied(outcome: &MutationOutcome) -> Result<(), ScenarioError> {
    if outcome.all_applied() {
        Ok(())
    } else {
        Err(ScenarioError::MutationFailed(outcome.failed.clone()))
    }
}

/// Fail unless every patch in the round was refused by the API server
///
/// Accepted patches have already been rolled back by the orchestrator; they
/// are still a scenario failure, named individually.
pub fn require_all_rejected(outcome: &MutationOutcome) -> Result<(), ScenarioError> {
    if outcome.all_rejected() {
        Ok(())
    } else if !outcome.succeeded.is_empty() {
        Err(ScenarioError::UnexpectedAcceptance(
            outcome.succeeded.clone(),
        ))
    } else {
        Err(ScenarioError::MutationFailed(outcome.failed.clone()))
    }
}
