use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Discovered coordinates of the custom resource under test
///
/// The group/version/plural triple every dynamic API call needs, plus the
/// kind the definition was matched on. Resolved once per process from the
/// installed resource definitions, never hard-coded, so the harness follows
/// whatever version the cluster serves - see
/// [`Context::descriptor`](super::Context::descriptor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gvr {
    /// API group (e.g., "network.example.com")
    pub group: String,
    /// Served API version the harness talks to (e.g., "v1")
    pub version: String,
    /// Plural resource name (e.g., "networkconfigs")
    pub plural: String,
    /// Kind the definition was matched on (e.g., "`NetworkConfig`")
    pub kind: String,
}

impl Gvr {
    /// Assemble a descriptor from discovered parts
    #[must_use]
    pub fn new(group: &str, version: &str, plural: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            kind: kind.to_string(),
        }
    }

    /// `group/version` as it appears on the wire ("v1" for the core group)
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// The kube `ApiResource` backing the dynamic API for this descriptor
    pub(crate) fn to_api_resource(&self) -> kube::core::ApiResource {
        kube::core::ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// Deep copy of a custom resource document, taken before any mutation
///
/// Holds the full document (metadata + spec + status) exactly as fetched;
/// used only to restore the resource, never partially applied.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Resource name
    pub name: String,
    /// Full document as fetched from the API
    pub document: serde_json::Value,
}

impl Snapshot {
    /// Capture a snapshot of a fetched document
    #[must_use]
    pub fn new(name: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            document,
        }
    }
}

/// One desired mutation: a JSON merge-patch body for a named resource
///
/// Carries no resourceVersion - merge patches do not need one.
#[derive(Debug, Clone)]
pub struct PatchIntent {
    /// Target resource name
    pub name: String,
    /// Partial document merged into the target
    pub body: serde_json::Value,
}

impl PatchIntent {
    /// Create a patch intent
    #[must_use]
    pub fn new(name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// Result of submitting one merge patch
///
/// A validation refusal from the API server is an expected outcome in
/// negative scenarios, so it is a value here rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The API server accepted and applied the patch
    Applied,
    /// The API server refused the patch (schema/validation rejection)
    Rejected {
        /// HTTP status code of the refusal
        status: u16,
        /// Response body text
        body: String,
    },
}

impl PatchOutcome {
    /// Whether the patch was applied
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied)
    }
}

/// Aggregate result of one concurrent mutation round
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    /// Resources whose patch was applied
    pub succeeded: Vec<String>,
    /// Resource name -> error text for every patch that did not apply
    pub failed: BTreeMap<String, String>,
    /// Subset of `failed` that were validation rejections
    pub rejected: BTreeMap<String, String>,
}

impl MutationOutcome {
    /// Whether every patch in the round was applied
    #[must_use]
    pub fn all_applied(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether every patch in the round was refused by the API server
    #[must_use]
    pub fn all_rejected(&self) -> bool {
        self.succeeded.is_empty() && self.rejected.len() == self.failed.len()
    }
}

/// Where to pull metrics for one workload pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Routable address of the node the pod is scheduled on
    pub node_address: String,
    /// Port serving /metrics
    pub port: i32,
    /// Service name to present for TLS validation on the mTLS path
    pub service_name: String,
}

/// Typed read-view of a NetworkConfig document
///
/// Decoded once at the API boundary; every field the harness reads is an
/// explicit `Option` here instead of an untyped map traversal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfigView {
    pub metadata: MetadataView,
    pub spec: NetworkConfigSpecView,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataView {
    pub name: Option<String>,
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfigSpecView {
    pub service_type: Option<String>,
    pub metrics_exporter: MetricsExporterView,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsExporterView {
    pub enable: Option<bool>,
    /// NodePort serving /metrics; tolerates an integer-in-string wire value
    #[serde(deserialize_with = "int_or_digit_string")]
    pub node_port: Option<i32>,
    pub port: Option<i32>,
    pub rbac_config: Option<RbacConfigView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RbacConfigView {
    pub enable: Option<bool>,
    pub client_ca_config_map: Option<NamedRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamedRef {
    pub name: Option<String>,
}

impl NetworkConfigView {
    /// Decode a view from a full document
    pub fn from_document(document: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document.clone())
    }

    /// Resource name, or "" when the document has none
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Accept an integer, a digit string, or anything else as `None`
fn int_or_digit_string<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
