use std::fmt;

use serde::{Deserialize, Serialize};
use vela_core::ObjectMeta;

use crate::kube_resource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPort {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub protocol: String,
    pub port: i32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub resource_version: String,
    pub api_version: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointAddress {
    pub hostname: String,
    pub ip: String,
    pub node_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<TargetRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EndpointAddress {
    pub fn id(&self) -> &str { &self.ip }
    pub fn name(&self) -> &str { &self.hostname }

    /// The target reference; endpoint targets are always core `v1` objects.
    pub fn target_ref(&self) -> Option<TargetRef> {
        self.target_ref.clone().map(|r| TargetRef { api_version: "v1".into(), ..r })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub not_ready_addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPort>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Display for EndpointSubset {
    /// Every ready address crossed with every port: `ip:port, ip:port`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .addresses
            .iter()
            .flat_map(|a| self.ports.iter().map(move |p| format!("{}:{}", a.ip, p.port)))
            .collect();
        f.write_str(&pairs.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<EndpointSubset>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

kube_resource!(Endpoint, "Endpoints", ("", "v1", "endpoints"), Namespaced);

impl Endpoint {
    pub fn subsets(&self) -> &[EndpointSubset] { &self.subsets }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.subsets.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        if joined.is_empty() { f.write_str("<none>") } else { f.write_str(&joined) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KubeResource;
    use serde_json::json;

    #[test]
    fn renders_address_port_pairs() {
        let e = Endpoint::from_raw(json!({
            "metadata": {"uid": "e1", "name": "web", "namespace": "default"},
            "subsets": [{
                "addresses": [
                    {"ip": "10.0.0.1", "targetRef": {"kind": "Pod", "name": "web-0", "namespace": "default"}},
                    {"ip": "10.0.0.2"}
                ],
                "notReadyAddresses": [{"ip": "10.0.0.3"}],
                "ports": [{"port": 80, "protocol": "TCP"}, {"port": 443, "protocol": "TCP"}]
            }]
        }))
        .unwrap();
        assert_eq!(e.kind, "Endpoints");
        assert_eq!(e.to_string(), "10.0.0.1:80, 10.0.0.1:443, 10.0.0.2:80, 10.0.0.2:443");
        let addr = &e.subsets()[0].addresses[0];
        assert_eq!(addr.target_ref().map(|r| r.api_version), Some("v1".to_string()));
        assert_eq!(e.subsets()[0].not_ready_addresses[0].id(), "10.0.0.3");
    }

    #[test]
    fn no_subsets_renders_none() {
        let e = Endpoint::from_raw(json!({"metadata": {"uid": "e2", "name": "x", "namespace": "d"}})).unwrap();
        assert_eq!(e.to_string(), "<none>");
    }
}
