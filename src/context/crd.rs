use super::types::{Gvr, NetworkConfigView, PatchOutcome, Snapshot};
use super::{classify_kube_error, AccessError, Context};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionVersion,
};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Kind name of the custom resource under test
pub const KIND_UNDER_TEST: &str = "NetworkConfig";

/// Process-wide descriptor cache. Written at most once; concurrent first
/// discoverers race to an identical value, so no further coordination is
/// needed. Invalidated only by process restart.
static DESCRIPTOR: OnceCell<Gvr> = OnceCell::const_new();

/// Pick the version to talk to among a definition's declared versions
///
/// The storage-flagged served version wins, else the first served version,
/// else the first declared version.
fn choose_version(versions: &[CustomResourceDefinitionVersion]) -> Option<&str> {
    versions
        .iter()
        .find(|v| v.served && v.storage)
        .or_else(|| versions.iter().find(|v| v.served))
        .or_else(|| versions.first())
        .map(|v| v.name.as_str())
}

impl Context {
    /// Group/version/plural of the custom resource, discovered once per process
    ///
    /// Lists the installed resource definitions and matches on kind name.
    /// The result is cached for the life of the process; a second call
    /// returns the cached triple without touching the API.
    pub async fn descriptor(&self) -> Result<&'static Gvr, AccessError> {
        DESCRIPTOR
            .get_or_try_init(|| self.discover_descriptor())
            .await
    }

    async fn discover_descriptor(&self) -> Result<Gvr, AccessError> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let list = crds
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(&e, "list custom resource definitions"))?;

        for crd in list.items {
            if crd.spec.names.kind != KIND_UNDER_TEST {
                continue;
            }
            let Some(version) = choose_version(&crd.spec.versions) else {
                continue;
            };

            info!(
                group = %crd.spec.group,
                version = %version,
                plural = %crd.spec.names.plural,
                "Discovered custom resource schema"
            );
            return Ok(Gvr::new(
                &crd.spec.group,
                version,
                &crd.spec.names.plural,
                KIND_UNDER_TEST,
            ));
        }

        Err(AccessError::SchemaNotFound(KIND_UNDER_TEST.to_string()))
    }

    async fn config_api(&self) -> Result<Api<DynamicObject>, AccessError> {
        let gvr = self.descriptor().await?;
        Ok(Api::namespaced_with(
            self.client.clone(),
            &self.settings.config_namespace,
            &gvr.to_api_resource(),
        ))
    }

    /// List all NetworkConfig documents in the configured namespace
    pub async fn list_configs(&self) -> Result<Vec<serde_json::Value>, AccessError> {
        let api = self.config_api().await?;

        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(&e, "list NetworkConfigs"))?;

        list.items
            .into_iter()
            .map(|obj| {
                serde_json::to_value(obj)
                    .map_err(|e| AccessError::Transport(format!("failed to serialize: {e}")))
            })
            .collect()
    }

    /// Get one NetworkConfig document by name
    pub async fn get_config(&self, name: &str) -> Result<serde_json::Value, AccessError> {
        let api = self.config_api().await?;

        let obj = api
            .get(name)
            .await
            .map_err(|e| classify_kube_error(&e, &format!("get NetworkConfig '{name}'")))?;

        serde_json::to_value(obj)
            .map_err(|e| AccessError::Transport(format!("failed to serialize: {e}")))
    }

    /// Snapshot every NetworkConfig in the configured namespace
    ///
    /// Documents without a name are skipped. Snapshots are full deep copies
    /// suitable for byte-identical restore.
    pub async fn snapshot_configs(&self) -> Result<Vec<Snapshot>, AccessError> {
        let mut snapshots = Vec::new();
        for document in self.list_configs().await? {
            let Some(name) = document
                .pointer("/metadata/name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
            else {
                continue;
            };
            snapshots.push(Snapshot::new(name, document));
        }
        Ok(snapshots)
    }

    /// nodePort currently recorded on each NetworkConfig
    ///
    /// Reads live documents, not snapshots. Configs without a usable
    /// nodePort are absent from the map (logged), so callers can decide
    /// whether that is fatal for their scenario.
    pub async fn node_ports_by_config(&self) -> Result<BTreeMap<String, i32>, AccessError> {
        let mut ports = BTreeMap::new();
        for document in self.list_configs().await? {
            let view = NetworkConfigView::from_document(&document)
                .map_err(|e| AccessError::Transport(format!("failed to decode: {e}")))?;
            let name = view.name().to_string();
            if name.is_empty() {
                continue;
            }
            match view.spec.metrics_exporter.node_port {
                Some(port) => {
                    ports.insert(name, port);
                }
                None => {
                    warn!(name = %name, "NetworkConfig has no usable spec.metricsExporter.nodePort");
                }
            }
        }
        Ok(ports)
    }

    /// Apply a JSON merge patch to one NetworkConfig
    ///
    /// A validation refusal from the API server comes back as
    /// [`PatchOutcome::Rejected`] - in negative scenarios that is the
    /// expected, asserted-on outcome, not a harness failure.
    pub async fn patch_config(
        &self,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<PatchOutcome, AccessError> {
        let api = self.config_api().await?;

        match api
            .patch(name, &PatchParams::default(), &Patch::Merge(body))
            .await
        {
            Ok(_) => {
                info!(
                    namespace = %self.settings.config_namespace,
                    name = %name,
                    "Patched NetworkConfig"
                );
                Ok(PatchOutcome::Applied)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(AccessError::NotFound(format!(
                "patch NetworkConfig '{name}': {}",
                ae.message
            ))),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(AccessError::Conflict(format!(
                "patch NetworkConfig '{name}': {}",
                ae.message
            ))),
            Err(kube::Error::Api(ae)) if (400..500).contains(&ae.code) => {
                debug!(
                    name = %name,
                    status = ae.code,
                    reason = %ae.reason,
                    "Patch refused by API server"
                );
                Ok(PatchOutcome::Rejected {
                    status: ae.code,
                    body: ae.message,
                })
            }
            Err(e) => Err(classify_kube_error(
                &e,
                &format!("patch NetworkConfig '{name}'"),
            )),
        }
    }

    /// Replace one NetworkConfig with a full document
    ///
    /// Fails with `Conflict` when the embedded resourceVersion is stale;
    /// callers wanting transparent retry use
    /// [`replace_with_retry`](Context::replace_with_retry).
    pub async fn replace_config(
        &self,
        name: &str,
        document: &serde_json::Value,
    ) -> Result<(), AccessError> {
        let api = self.config_api().await?;

        let obj: DynamicObject = serde_json::from_value(document.clone())
            .map_err(|e| AccessError::Transport(format!("invalid document for '{name}': {e}")))?;

        api.replace(name, &PostParams::default(), &obj)
            .await
            .map_err(|e| classify_kube_error(&e, &format!("replace NetworkConfig '{name}'")))?;

        info!(
            namespace = %self.settings.config_namespace,
            name = %name,
            "Replaced NetworkConfig"
        );
        Ok(())
    }
}
