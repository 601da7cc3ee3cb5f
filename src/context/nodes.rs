use super::{classify_kube_error, AccessError, Context};
use crate::retry::{retry, Backoff};
use k8s_openapi::api::core::v1::Node;
use kube::api::Api;
use std::time::Duration;
use tracing::error;

/// Attempts before declaring a node address unresolvable
const RESOLVE_ATTEMPTS: u32 = 3;

/// Delay between resolution attempts
const RESOLVE_DELAY: Duration = Duration::from_secs(1);

impl Context {
    /// Resolve a node's InternalIP, or `None` if it cannot be resolved
    ///
    /// Address propagation can lag slightly after scheduling, so a short
    /// bounded retry absorbs that. Fails soft: exhausting the retries logs
    /// an error and yields `None`, it never raises - an unresolved node is
    /// a per-pod reporting item, not a scenario abort.
    pub async fn node_internal_ip(&self, node_name: &str) -> Option<String> {
        if node_name.is_empty() {
            error!("node name is empty");
            return None;
        }

        let nodes: Api<Node> = Api::all(self.client.clone());

        let result: Result<String, AccessError> = retry(|| {
            let nodes = nodes.clone();
            async move {
                let node = nodes
                    .get(node_name)
                    .await
                    .map_err(|e| classify_kube_error(&e, &format!("read node '{node_name}'")))?;

                node.status
                    .and_then(|s| s.addresses)
                    .unwrap_or_default()
                    .into_iter()
                    .find(|a| a.type_ == "InternalIP")
                    .map(|a| a.address)
                    .ok_or_else(|| {
                        AccessError::NotFound(format!("no InternalIP on node '{node_name}'"))
                    })
            }
        })
        .attempts(RESOLVE_ATTEMPTS)
        .backoff(Backoff::Fixed(RESOLVE_DELAY))
        .run()
        .await;

        match result {
            Ok(address) => Some(address),
            Err(e) => {
                error!(
                    node = %node_name,
                    attempts = RESOLVE_ATTEMPTS,
                    error = %e,
                    "Failed to resolve node address"
                );
                None
            }
        }
    }
}
