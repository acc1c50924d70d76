//! API base paths (`/api/v1/pods`, `/apis/apps/v1/statefulsets`) and URL building.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PathError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Namespaced,
    Cluster,
}

impl Scope {
    pub fn is_namespaced(self) -> bool { matches!(self, Scope::Namespaced) }
}

/// A resource collection address split into its API prefix, group, version and plural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiBase {
    /// `api` for the core group, `apis` otherwise.
    pub prefix: String,
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl ApiBase {
    /// Build from parts; an empty group selects the core `/api` prefix.
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            prefix: if group.is_empty() { "api".into() } else { "apis".into() },
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn parse(path: &str) -> Result<Self, PathError> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match parts.as_slice() {
            ["api", version, resource] => Ok(Self {
                prefix: "api".into(),
                group: String::new(),
                version: (*version).to_string(),
                resource: (*resource).to_string(),
            }),
            ["apis", group, version, resource] => Ok(Self {
                prefix: "apis".into(),
                group: (*group).to_string(),
                version: (*version).to_string(),
                resource: (*resource).to_string(),
            }),
            _ => Err(PathError::InvalidApiBase(path.to_string())),
        }
    }

    /// `v1` for the core group, `group/version` otherwise.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    pub fn collection_path(&self, namespace: Option<&str>) -> String {
        let ns = match namespace {
            Some(ns) => format!("/namespaces/{}", ns),
            None => String::new(),
        };
        format!("/{}/{}{}/{}", self.prefix, self.api_version(), ns, self.resource)
    }

    pub fn item_path(&self, namespace: Option<&str>, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection_path(None))
    }
}
