use serde::{Deserialize, Serialize};

use crate::{kube_resource, KubeObject};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type Namespace = KubeObject<NamespaceSpec, NamespaceStatus>;

kube_resource!(Namespace, "Namespace", ("", "v1", "namespaces"), Cluster);

impl Namespace {
    pub fn phase(&self) -> &str { self.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("") }
}
