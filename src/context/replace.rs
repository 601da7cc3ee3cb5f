use super::types::NetworkConfigView;
use super::{AccessError, Context};
use crate::retry::{retry, Backoff};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};

/// Attempts before giving up on a conflicted replace
const REPLACE_ATTEMPTS: u32 = 5;

/// Linear backoff base between conflicted attempts
const REPLACE_BACKOFF_BASE: Duration = Duration::from_millis(500);

impl Context {
    /// Replace a NetworkConfig, absorbing resourceVersion conflicts
    ///
    /// Scenario workers and the controller under test write the same
    /// resources concurrently, so stale-resourceVersion conflicts are
    /// expected here, not exceptional. On conflict the latest
    /// resourceVersion is copied into the document and the replace is
    /// retried with linear backoff; any other error propagates immediately.
    /// Exhausting the attempts surfaces the last conflict.
    pub async fn replace_with_retry(
        &self,
        name: &str,
        document: serde_json::Value,
    ) -> Result<(), AccessError> {
        let doc = Arc::new(Mutex::new(document));

        retry(|| {
            let doc = doc.clone();
            async move {
                let body = doc.lock().unwrap().clone();
                match self.replace_config(name, &body).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_conflict() => {
                        warn!(
                            namespace = %self.settings.config_namespace,
                            name = %name,
                            "Conflict replacing NetworkConfig; fetching latest resourceVersion"
                        );
                        match self.get_config(name).await {
                            Ok(latest) => {
                                let rv = NetworkConfigView::from_document(&latest)
                                    .ok()
                                    .and_then(|view| view.metadata.resource_version);
                                match rv {
                                    Some(rv) => {
                                        let mut guard = doc.lock().unwrap();
                                        if let Some(obj) = guard.as_object_mut() {
                                            obj.entry("metadata")
                                                .or_insert_with(|| serde_json::json!({}))
                                                ["resourceVersion"] = serde_json::Value::String(rv);
                                        }
                                    }
                                    None => {
                                        error!(name = %name, "Latest NetworkConfig has no resourceVersion");
                                    }
                                }
                            }
                            Err(ge) => {
                                error!(name = %name, error = %ge, "Failed to fetch latest NetworkConfig");
                            }
                        }
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .attempts(REPLACE_ATTEMPTS)
        .backoff(Backoff::Linear(REPLACE_BACKOFF_BASE))
        .retry_if(AccessError::is_conflict)
        .run()
        .await
    }
}
