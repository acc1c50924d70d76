use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use vela_core::{Labels, ObjectMeta};

use crate::kube_resource;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SecretType {
    #[default]
    Opaque,
    ServiceAccountToken,
    Dockercfg,
    DockerConfigJson,
    BasicAuth,
    SshAuth,
    Tls,
    BootstrapToken,
    Other(String),
}

impl SecretType {
    pub fn as_str(&self) -> &str {
        match self {
            SecretType::Opaque => "Opaque",
            SecretType::ServiceAccountToken => "kubernetes.io/service-account-token",
            SecretType::Dockercfg => "kubernetes.io/dockercfg",
            SecretType::DockerConfigJson => "kubernetes.io/dockerconfigjson",
            SecretType::BasicAuth => "kubernetes.io/basic-auth",
            SecretType::SshAuth => "kubernetes.io/ssh-auth",
            SecretType::Tls => "kubernetes.io/tls",
            SecretType::BootstrapToken => "bootstrap.kubernetes.io/token",
            SecretType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "" | "Opaque" => SecretType::Opaque,
            "kubernetes.io/service-account-token" => SecretType::ServiceAccountToken,
            "kubernetes.io/dockercfg" => SecretType::Dockercfg,
            "kubernetes.io/dockerconfigjson" => SecretType::DockerConfigJson,
            "kubernetes.io/basic-auth" => SecretType::BasicAuth,
            "kubernetes.io/ssh-auth" => SecretType::SshAuth,
            "kubernetes.io/tls" => SecretType::Tls,
            "bootstrap.kubernetes.io/token" => SecretType::BootstrapToken,
            other => SecretType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl Serialize for SecretType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SecretType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(SecretType::parse(s.as_deref().unwrap_or("")))
    }
}

/// Secret payload keys and base64 values, in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default)]
    pub type_: SecretType,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub data: Labels,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

kube_resource!(Secret, "Secret", ("", "v1", "secrets"), Namespaced);

impl Secret {
    pub fn secret_type(&self) -> &SecretType { &self.type_ }

    pub fn keys(&self) -> Vec<&str> { self.data.keys().collect() }

    /// The base64 `token` entry, as stored.
    pub fn token(&self) -> Option<&str> { self.data.get("token") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KubeResource;
    use serde_json::json;

    #[test]
    fn decodes_type_and_keys() {
        let s = Secret::from_raw(json!({
            "metadata": {"uid": "s1", "name": "sa-token", "namespace": "kube-system"},
            "type": "kubernetes.io/service-account-token",
            "data": {"token": "dG9r", "ca.crt": "Y2E="}
        }))
        .unwrap();
        assert_eq!(s.secret_type(), &SecretType::ServiceAccountToken);
        assert_eq!(s.keys(), vec!["token", "ca.crt"]);
        assert_eq!(s.token(), Some("dG9r"));
    }

    #[test]
    fn missing_type_is_opaque_and_unknown_is_kept() {
        let s = Secret::from_raw(json!({"metadata": {"uid": "s2", "name": "x", "namespace": "d"}})).unwrap();
        assert_eq!(s.secret_type(), &SecretType::Opaque);
        assert!(s.keys().is_empty());
        assert_eq!(SecretType::parse("helm.sh/release.v1").as_str(), "helm.sh/release.v1");
    }
}
