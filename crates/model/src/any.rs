//! Closed set of supported kinds, dispatched on the raw `kind` string.

use serde::Serialize;
use serde_json::Value;
use vela_core::{ConstructionError, ObjectMeta, Scope};

use crate::{
    DaemonSet, Deployment, Endpoint, Job, KubeResource, Namespace, Node, PersistentVolumeClaim, Pod, ReplicaSet,
    Secret, StatefulSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub kind: &'static str,
    pub api_base: &'static str,
    pub namespaced: bool,
}

const fn info<K: KubeResource>() -> KindInfo {
    KindInfo { kind: K::KIND, api_base: K::API_BASE, namespaced: matches!(K::SCOPE, Scope::Namespaced) }
}

pub const KINDS: [KindInfo; 11] = [
    info::<Pod>(),
    info::<Node>(),
    info::<Job>(),
    info::<DaemonSet>(),
    info::<StatefulSet>(),
    info::<Deployment>(),
    info::<ReplicaSet>(),
    info::<Secret>(),
    info::<Endpoint>(),
    info::<PersistentVolumeClaim>(),
    info::<Namespace>(),
];

/// Case-insensitive lookup by kind name or plural resource (`pods`, `StatefulSet`).
pub fn find_kind(name: &str) -> Option<&'static KindInfo> {
    KINDS.iter().find(|k| {
        k.kind.eq_ignore_ascii_case(name) || k.api_base.rsplit('/').next().map_or(false, |r| r.eq_ignore_ascii_case(name))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnyObject {
    Pod(Pod),
    Node(Node),
    Job(Job),
    DaemonSet(DaemonSet),
    StatefulSet(StatefulSet),
    Deployment(Deployment),
    ReplicaSet(ReplicaSet),
    Secret(Secret),
    Endpoint(Endpoint),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Namespace(Namespace),
}

macro_rules! each_variant {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            AnyObject::Pod($v) => $body,
            AnyObject::Node($v) => $body,
            AnyObject::Job($v) => $body,
            AnyObject::DaemonSet($v) => $body,
            AnyObject::StatefulSet($v) => $body,
            AnyObject::Deployment($v) => $body,
            AnyObject::ReplicaSet($v) => $body,
            AnyObject::Secret($v) => $body,
            AnyObject::Endpoint($v) => $body,
            AnyObject::PersistentVolumeClaim($v) => $body,
            AnyObject::Namespace($v) => $body,
        }
    };
}

impl AnyObject {
    pub fn from_raw(raw: Value) -> Result<Self, ConstructionError> {
        let kind = raw.get("kind").and_then(Value::as_str).unwrap_or("").to_string();
        Self::from_raw_as(&kind, raw)
    }

    /// Construct as `kind`, for list items that omit their own `kind`.
    pub fn from_raw_as(kind: &str, raw: Value) -> Result<Self, ConstructionError> {
        Ok(match kind {
            "Pod" => AnyObject::Pod(Pod::from_raw(raw)?),
            "Node" => AnyObject::Node(Node::from_raw(raw)?),
            "Job" => AnyObject::Job(Job::from_raw(raw)?),
            "DaemonSet" => AnyObject::DaemonSet(DaemonSet::from_raw(raw)?),
            "StatefulSet" => AnyObject::StatefulSet(StatefulSet::from_raw(raw)?),
            "Deployment" => AnyObject::Deployment(Deployment::from_raw(raw)?),
            "ReplicaSet" => AnyObject::ReplicaSet(ReplicaSet::from_raw(raw)?),
            "Secret" => AnyObject::Secret(Secret::from_raw(raw)?),
            "Endpoints" => AnyObject::Endpoint(Endpoint::from_raw(raw)?),
            "PersistentVolumeClaim" => AnyObject::PersistentVolumeClaim(PersistentVolumeClaim::from_raw(raw)?),
            "Namespace" => AnyObject::Namespace(Namespace::from_raw(raw)?),
            other => return Err(ConstructionError::UnknownKind(other.to_string())),
        })
    }

    pub fn kind(&self) -> &'static str {
        fn k<K: KubeResource>(_: &K) -> &'static str { K::KIND }
        each_variant!(self, o => k(o))
    }

    pub fn meta(&self) -> &ObjectMeta { each_variant!(self, o => o.meta()) }

    pub fn id(&self) -> &str { &self.meta().uid }
    pub fn name(&self) -> &str { &self.meta().name }
    pub fn namespace(&self) -> Option<&str> { self.meta().namespace.as_deref() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatches_on_kind() {
        let o = AnyObject::from_raw(json!({"kind": "Endpoints", "metadata": {"uid": "e", "name": "svc", "namespace": "d"}})).unwrap();
        assert!(matches!(o, AnyObject::Endpoint(_)));
        assert_eq!(o.kind(), "Endpoints");
        assert_eq!(o.namespace(), Some("d"));

        let n = AnyObject::from_raw_as("Node", json!({"metadata": {"uid": "n", "name": "n1"}})).unwrap();
        assert_eq!(n.kind(), "Node");
        assert!(matches!(
            AnyObject::from_raw(json!({"kind": "Service", "metadata": {"uid": "s", "name": "s"}})),
            Err(ConstructionError::UnknownKind(_))
        ));
    }

    #[test]
    fn kind_table() {
        assert_eq!(KINDS.len(), 11);
        assert_eq!(find_kind("pods").map(|k| k.kind), Some("Pod"));
        assert_eq!(find_kind("statefulset").map(|k| k.api_base), Some("/apis/apps/v1/statefulsets"));
        assert_eq!(find_kind("nodes").map(|k| k.namespaced), Some(false));
        assert!(find_kind("services").is_none());
    }
}
