//! Cluster access layer
//!
//! Provides a connection to the cluster under test plus every remote
//! primitive the scenarios compose: custom-resource access, conflict-safe
//! replace, concurrent mutation with rollback, node address resolution,
//! in-pod command execution and the metrics readiness probe.
//!
//! # Errors
//!
//! Resource-access methods return [`AccessError`]. `Conflict` is absorbed by
//! the conflict-safe replace; `SchemaNotFound` is fatal to the whole run;
//! everything else propagates to the scenario layer. Validation refusals are
//! not errors at all - see [`PatchOutcome`](types::PatchOutcome).

mod crd;
mod exec;
mod mutate;
mod nodes;
mod probe;
mod replace;
pub mod types;
pub mod workload;

pub use crd::KIND_UNDER_TEST;
pub use mutate::apply_with_rollback;
pub use types::{
    Gvr, MetricsExporterView, MutationOutcome, NetworkConfigView, PatchIntent, PatchOutcome,
    PortBinding, Snapshot,
};
pub use workload::{config_for_pod, split_configs, PodBindings, WorkloadPod};

use crate::config::Settings;
use kube::Client;

/// Harness context: cluster connection plus environment-driven settings
///
/// # Example
///
/// ```ignore
/// use verkko::Context;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ctx = Context::new().await?;
///
///     let configs = ctx.list_configs().await?;
///     println!("found {} NetworkConfigs", configs.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Harness settings
    pub settings: Settings,
}

impl Context {
    /// Connect using the default kubeconfig resolution and env settings
    pub async fn new() -> Result<Self, AccessError> {
        let client = Client::try_default()
            .await
            .map_err(|e| AccessError::Transport(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            settings: Settings::from_env(),
        })
    }

    /// Build a context from an existing client and explicit settings
    #[must_use]
    pub fn with_settings(client: Client, settings: Settings) -> Self {
        Self { client, settings }
    }
}

/// Errors from resource access
///
/// `SchemaNotFound` aborts the run - nothing works without the resource
/// descriptor. `Conflict` is expected under concurrent writes and retried by
/// `replace_with_retry`; `NotFound` and `Transport` propagate to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("no custom resource definition found for kind '{0}'")]
    SchemaNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl AccessError {
    /// Whether this is a resourceVersion conflict
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, AccessError::Conflict(_))
    }
}

/// Classify a kube error for a resource operation
///
/// 404 becomes `NotFound`, 409 becomes `Conflict`, everything else is a
/// transport-level failure. Validation refusals (other 4xx) are handled
/// separately by the patch path, which reports them as values.
fn classify_kube_error(err: &kube::Error, what: &str) -> AccessError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => {
            AccessError::NotFound(format!("{what}: {}", ae.message))
        }
        kube::Error::Api(ae) if ae.code == 409 => {
            AccessError::Conflict(format!("{what}: {}", ae.message))
        }
        _ => AccessError::Transport(format!("{what}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify_kube_error(&api_error(404, "networkconfigs \"x\" not found"), "get x");
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[test]
    fn test_classify_conflict() {
        let err = classify_kube_error(&api_error(409, "the object has been modified"), "replace x");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_classify_other_as_transport() {
        let err = classify_kube_error(&api_error(503, "service unavailable"), "list");
        assert!(matches!(err, AccessError::Transport(_)));
    }
}
