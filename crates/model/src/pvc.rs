use serde::{Deserialize, Serialize};
use vela_core::{LabelSelector, LabelSelectorRequirement};

use crate::common::ResourceRequirements;
use crate::{kube_resource, KubeObject, KubeResource, Pod};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistentVolumeClaimSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentVolumeClaimStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type PersistentVolumeClaim = KubeObject<PersistentVolumeClaimSpec, PersistentVolumeClaimStatus>;

kube_resource!(PersistentVolumeClaim, "PersistentVolumeClaim", ("", "v1", "persistentvolumeclaims"), Namespaced);

impl PersistentVolumeClaim {
    /// Pods in the claim's namespace that mount it by name.
    pub fn pods<'a>(&self, pods: impl IntoIterator<Item = &'a Pod>) -> Vec<&'a Pod> {
        pods.into_iter()
            .filter(|p| p.namespace() == self.namespace() && p.mounts_claim(self.name()))
            .collect()
    }

    pub fn storage(&self) -> &str {
        self.spec.resources.as_ref().and_then(|r| r.requests.get("storage")).unwrap_or("-")
    }

    pub fn match_labels(&self) -> Vec<String> {
        self.spec.selector.as_ref().map(|s| s.match_labels.stringify_with(":")).unwrap_or_default()
    }

    pub fn match_expressions(&self) -> &[LabelSelectorRequirement] {
        self.spec.selector.as_ref().map(|s| s.match_expressions.as_slice()).unwrap_or(&[])
    }

    /// Phase, or `-` when unknown.
    pub fn status(&self) -> &str { self.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("-") }
}
