//! Typed Kubernetes resources behind one `KubeResource` contract.

#![forbid(unsafe_code)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use vela_core::{ApiBase, ConstructionError, LabelSelector, Labels, ObjectMeta, OwnerReference, Scope};

pub mod any;
pub mod common;
pub mod endpoint;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod pvc;
pub mod secret;
pub mod units;
pub mod workloads;

pub use any::{find_kind, AnyObject, KindInfo, KINDS};
pub use common::PodTemplated;
pub use endpoint::Endpoint;
pub use namespace::Namespace;
pub use node::Node;
pub use pod::{Pod, PodStatusPhase};
pub use pvc::PersistentVolumeClaim;
pub use secret::{Secret, SecretType};
pub use workloads::{DaemonSet, Deployment, Job, ReplicaSet, StatefulSet};

/// Annotation written by `kubectl apply`, hidden from filtered annotation lists.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Generic envelope for kinds with a `spec` and optional `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeObject<Spec, Status> {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Spec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Fields outside the typed view, kept so writes send them back unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An owner reference tagged with the namespace of the object that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub owner: OwnerReference,
    pub namespace: Option<String>,
}

pub trait KubeResource: Clone + fmt::Debug + Serialize + Send + Sync + 'static {
    const KIND: &'static str;
    const API_BASE: &'static str;
    const SCOPE: Scope;

    fn api_base() -> ApiBase;
    fn from_raw(raw: Value) -> Result<Self, ConstructionError>;
    fn meta(&self) -> &ObjectMeta;

    fn id(&self) -> &str { &self.meta().uid }
    fn name(&self) -> &str { &self.meta().name }
    fn namespace(&self) -> Option<&str> { self.meta().namespace.as_deref() }
    fn resource_version(&self) -> &str { &self.meta().resource_version }
    fn descriptor(&self) -> String { self.meta().descriptor() }
    fn creation_timestamp(&self) -> Option<DateTime<Utc>> { self.meta().creation_time() }

    /// Compact age relative to `now`; `0s` when the creation time is unknown.
    fn age(&self, now: DateTime<Utc>) -> String {
        let diff = self.creation_timestamp().map(|t| now - t).unwrap_or_else(chrono::Duration::zero);
        units::format_duration(diff)
    }

    fn labels(&self) -> Vec<String> { self.meta().labels.stringify() }

    fn annotations(&self, filter: bool) -> Vec<String> {
        let all = self.meta().annotations.stringify();
        if !filter {
            return all;
        }
        all.into_iter().filter(|a| !a.starts_with(LAST_APPLIED_ANNOTATION)).collect()
    }

    fn finalizers(&self) -> &[String] { &self.meta().finalizers }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        let ns = self.meta().namespace.clone();
        self.meta()
            .owner_references
            .iter()
            .map(|o| OwnerRef { owner: o.clone(), namespace: ns.clone() })
            .collect()
    }

    fn search_fields(&self) -> Vec<String> {
        let mut out = vec![self.name().to_string()];
        out.extend(self.namespace().map(str::to_string));
        out.push(self.id().to_string());
        out.extend(self.labels());
        out.extend(self.annotations(true));
        out
    }

    fn is_non_system(&self) -> bool { !self.name().starts_with("system:") }
}

fn required_str<'a>(
    meta: &'a serde_json::Map<String, Value>,
    kind: &'static str,
    field: &'static str,
) -> Result<&'a str, ConstructionError> {
    meta.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ConstructionError::MissingField { kind, field })
}

/// Validate the metadata envelope and scope of `raw`, then decode it leniently as `K`.
pub fn decode<K: KubeResource + DeserializeOwned>(mut raw: Value) -> Result<K, ConstructionError> {
    let kind = K::KIND;
    let obj = raw.as_object_mut().ok_or(ConstructionError::NotAnObject { kind })?;
    let name = {
        let meta = obj
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
            .ok_or(ConstructionError::MissingMetadata { kind })?;
        required_str(meta, kind, "uid")?;
        let name = required_str(meta, kind, "name")?.to_string();
        meta.remove("managedFields");
        // an empty namespace is treated as absent
        if meta.get("namespace").and_then(Value::as_str) == Some("") {
            meta.remove("namespace");
        }
        let ns = meta.get("namespace").and_then(Value::as_str).map(str::to_string);
        match (K::SCOPE, ns) {
            (Scope::Namespaced, None) => return Err(ConstructionError::MissingNamespace { kind, name }),
            (Scope::Cluster, Some(namespace)) => {
                return Err(ConstructionError::UnexpectedNamespace { kind, name, namespace })
            }
            _ => {}
        }
        name
    };
    // list items usually arrive without kind/apiVersion
    obj.entry("kind").or_insert_with(|| Value::from(kind));
    obj.entry("apiVersion").or_insert_with(|| Value::from(K::api_base().api_version()));
    serde_json::from_value(raw).map_err(|e| ConstructionError::Malformed { kind, name, reason: e.to_string() })
}

/// Implements `KubeResource` for a kind from its api group/version/plural and scope.
#[macro_export]
macro_rules! kube_resource {
    (@impl $ty:ty, $kind:literal, $base:expr, $group:literal, $version:literal, $plural:literal, $scope:ident) => {
        impl $crate::KubeResource for $ty {
            const KIND: &'static str = $kind;
            const API_BASE: &'static str = $base;
            const SCOPE: $crate::Scope = $crate::Scope::$scope;

            fn api_base() -> $crate::ApiBase { $crate::ApiBase::new($group, $version, $plural) }

            fn from_raw(raw: serde_json::Value) -> Result<Self, $crate::ConstructionError> {
                $crate::decode::<Self>(raw)
            }

            fn meta(&self) -> &$crate::ObjectMeta { &self.metadata }
        }
    };
    ($ty:ty, $kind:literal, ("", $version:literal, $plural:literal), $scope:ident) => {
        $crate::kube_resource!(@impl $ty, $kind, concat!("/api/", $version, "/", $plural), "", $version, $plural, $scope);
    };
    ($ty:ty, $kind:literal, ($group:literal, $version:literal, $plural:literal), $scope:ident) => {
        $crate::kube_resource!(
            @impl $ty, $kind, concat!("/apis/", $group, "/", $version, "/", $plural), $group, $version, $plural, $scope
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_bad_envelopes() {
        assert!(matches!(Pod::from_raw(json!("pod")), Err(ConstructionError::NotAnObject { .. })));
        assert!(matches!(Pod::from_raw(json!({"kind": "Pod"})), Err(ConstructionError::MissingMetadata { .. })));
        assert!(matches!(
            Pod::from_raw(json!({"metadata": {"uid": "", "name": "x", "namespace": "d"}})),
            Err(ConstructionError::MissingField { field: "uid", .. })
        ));
        assert!(matches!(
            Pod::from_raw(json!({"metadata": {"uid": "u", "namespace": "d"}})),
            Err(ConstructionError::MissingField { field: "name", .. })
        ));
    }

    #[test]
    fn enforces_scope() {
        let no_ns = json!({"metadata": {"uid": "u", "name": "p", "namespace": ""}});
        assert!(matches!(Pod::from_raw(no_ns), Err(ConstructionError::MissingNamespace { .. })));
        let with_ns = json!({"metadata": {"uid": "u", "name": "n1", "namespace": "default"}});
        assert!(matches!(Node::from_raw(with_ns), Err(ConstructionError::UnexpectedNamespace { .. })));
    }

    #[test]
    fn fills_kind_and_common_accessors() {
        let pod = Pod::from_raw(json!({
            "metadata": {
                "uid": "u1", "name": "web", "namespace": "default", "resourceVersion": "7",
                "creationTimestamp": "2024-01-01T00:00:00Z",
                "labels": {"app": "web"},
                "annotations": {LAST_APPLIED_ANNOTATION: "{}", "team": "a"},
                "ownerReferences": [{"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web-1", "uid": "rs"}],
                "managedFields": [{"manager": "kubectl"}]
            }
        }))
        .unwrap();
        assert_eq!(pod.kind, "Pod");
        assert_eq!(pod.api_version, "v1");
        assert_eq!(pod.descriptor(), "default/web");
        assert_eq!(pod.annotations(true), vec!["team=a".to_string()]);
        assert_eq!(pod.annotations(false).len(), 2);
        assert_eq!(pod.owner_refs()[0].namespace.as_deref(), Some("default"));
        assert_eq!(pod.search_fields(), vec!["web", "default", "u1", "app=web", "team=a"]);
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:03:20Z").unwrap().with_timezone(&Utc);
        assert_eq!(pod.age(now), "3m20s");
        assert!(pod.is_non_system());
    }

    #[test]
    fn malformed_body_is_a_construction_error() {
        let bad = json!({"metadata": {"uid": "u", "name": "p", "namespace": "d"}, "spec": {"containers": "nope"}});
        assert!(matches!(Pod::from_raw(bad), Err(ConstructionError::Malformed { .. })));
    }

    #[test]
    fn api_base_constants_agree() {
        assert_eq!(Pod::API_BASE, "/api/v1/pods");
        assert_eq!(StatefulSet::API_BASE, "/apis/apps/v1/statefulsets");
        assert_eq!(StatefulSet::api_base().to_string(), StatefulSet::API_BASE);
        assert_eq!(Job::api_base().api_version(), "batch/v1");
    }
}
