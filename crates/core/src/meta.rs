use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Labels, Uid};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

/// Object metadata: the identity (`uid`, `name`, `namespace`, `resourceVersion`)
/// plus labels, annotations and ownership.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub uid: Uid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub annotations: Labels,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Fields outside the typed view, kept so writes send them back unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ObjectMeta {
    /// `"namespace/name"` for namespaced objects, `"name"` otherwise.
    pub fn descriptor(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        parse_time(self.creation_timestamp.as_deref())
    }

    pub fn deletion_time(&self) -> Option<DateTime<Utc>> {
        parse_time(self.deletion_timestamp.as_deref())
    }
}

fn parse_time(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_metadata() {
        let meta: ObjectMeta = serde_json::from_value(json!({
            "uid": "u1",
            "name": "web",
            "namespace": "default",
            "resourceVersion": "42",
            "creationTimestamp": "2020-01-01T00:00:00Z",
            "labels": {"app": "web"},
            "ownerReferences": [{"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web-1", "uid": "rs1", "controller": true}],
            "managedFields": [],
        }))
        .unwrap();
        assert_eq!(meta.descriptor(), "default/web");
        assert_eq!(meta.resource_version, "42");
        assert_eq!(meta.creation_time().map(|t| t.timestamp()), Some(1_577_836_800));
        assert_eq!(meta.owner_references[0].uid, "rs1");
        assert_eq!(meta.labels.get("app"), Some("web"));
    }
}
