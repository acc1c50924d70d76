use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use vela_core::Labels;

use crate::common::Condition;
use crate::units::{cpu_units_to_number, units_to_bytes};
use crate::{kube_resource, KubeObject};

static NODE_ROLE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*node-role\.kubernetes\.io/+(?P<role>.+)$").expect("static regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Taint {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_added: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `key=value:effect`, or `key:effect` when the taint has no value.
pub fn format_taint(t: &Taint) -> String {
    match t.value.as_deref() {
        Some(v) if !v.is_empty() => format!("{}={}:{}", t.key, v, t.effect),
        _ => format!("{}:{}", t.key, t.effect),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSpec {
    #[serde(rename = "podCIDR", skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,
    #[serde(rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    pub unschedulable: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSystemInfo {
    #[serde(rename = "machineID")]
    pub machine_id: String,
    pub kernel_version: String,
    pub os_image: String,
    pub container_runtime_version: String,
    pub kubelet_version: String,
    pub kube_proxy_version: String,
    pub operating_system: String,
    pub architecture: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub type_: String,
    pub address: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStatus {
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub capacity: Labels,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub allocatable: Labels,
    pub conditions: Vec<Condition>,
    pub addresses: Vec<NodeAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_info: Option<NodeSystemInfo>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type Node = KubeObject<NodeSpec, NodeStatus>;

kube_resource!(Node, "Node", ("", "v1", "nodes"), Cluster);

impl Node {
    /// Types of all True conditions, space separated.
    pub fn condition_text(&self) -> String {
        let Some(status) = &self.status else { return String::new() };
        status.conditions.iter().filter(|c| c.is_true()).map(|c| c.type_.as_str()).collect::<Vec<_>>().join(" ")
    }

    pub fn taints(&self) -> &[Taint] { &self.spec.taints }

    pub fn taints_formatted(&self) -> Vec<String> { self.spec.taints.iter().map(format_taint).collect() }

    pub fn role_labels(&self) -> String {
        let labels = &self.metadata.labels;
        let mut roles: Vec<&str> = labels
            .keys()
            .filter_map(|k| NODE_ROLE_KEY.captures(k).and_then(|c| c.name("role")).map(|m| m.as_str()))
            .collect();
        roles.extend(labels.get("kubernetes.io/role"));
        roles.extend(labels.get("node.kubernetes.io/role"));
        roles.join(", ")
    }

    pub fn cpu_capacity(&self) -> f64 {
        self.status.as_ref().and_then(|s| s.capacity.get("cpu")).map_or(0.0, cpu_units_to_number)
    }

    pub fn memory_capacity(&self) -> f64 {
        self.status.as_ref().and_then(|s| s.capacity.get("memory")).map_or(0.0, units_to_bytes)
    }

    pub fn is_unschedulable(&self) -> bool { self.spec.unschedulable }

    /// Conditions, led by a synthetic `SchedulingDisabled=True` when cordoned.
    pub fn conditions(&self) -> Vec<Condition> {
        let mut out = Vec::new();
        if self.is_unschedulable() {
            out.push(Condition::new("SchedulingDisabled", "True"));
        }
        if let Some(status) = &self.status {
            out.extend(status.conditions.iter().cloned());
        }
        out
    }

    pub fn active_conditions(&self) -> Vec<Condition> {
        self.conditions().into_iter().filter(Condition::is_true).collect()
    }

    pub fn warning_conditions(&self) -> Vec<Condition> {
        const GOOD: [&str; 3] = ["Ready", "HostUpgrades", "SchedulingDisabled"];
        self.active_conditions().into_iter().filter(|c| !GOOD.contains(&c.type_.as_str())).collect()
    }

    pub fn kubelet_version(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.node_info.as_ref())
            .map(|i| i.kubelet_version.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or("<unknown>")
    }

    pub fn operating_system(&self) -> &str {
        let labels = &self.metadata.labels;
        labels
            .get("kubernetes.io/os")
            .filter(|s| !s.is_empty())
            .or_else(|| labels.get("beta.kubernetes.io/os").filter(|s| !s.is_empty()))
            .or_else(|| {
                self.status
                    .as_ref()
                    .and_then(|s| s.node_info.as_ref())
                    .map(|i| i.operating_system.as_str())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or("linux")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KubeResource;
    use serde_json::json;

    fn node() -> Node {
        Node::from_raw(json!({
            "metadata": {
                "uid": "n1", "name": "worker-1",
                "labels": {
                    "node-role.kubernetes.io/control-plane": "",
                    "node-role.kubernetes.io/master": "",
                    "kubernetes.io/role": "infra",
                    "beta.kubernetes.io/os": "windows"
                }
            },
            "spec": {"unschedulable": true, "taints": [
                {"key": "dedicated", "value": "gpu", "effect": "NoSchedule"},
                {"key": "node.kubernetes.io/unreachable", "effect": "NoExecute"}
            ]},
            "status": {
                "capacity": {"cpu": "3500m", "memory": "4Gi"},
                "conditions": [
                    {"type": "Ready", "status": "True"},
                    {"type": "MemoryPressure", "status": "True"},
                    {"type": "DiskPressure", "status": "False"}
                ],
                "nodeInfo": {"kubeletVersion": "v1.29.1", "operatingSystem": "linux"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn roles_and_taints() {
        let n = node();
        assert_eq!(n.role_labels(), "control-plane, master, infra");
        assert_eq!(n.taints_formatted(), vec!["dedicated=gpu:NoSchedule", "node.kubernetes.io/unreachable:NoExecute"]);
    }

    #[test]
    fn conditions_include_scheduling_disabled() {
        let n = node();
        let types: Vec<String> = n.conditions().into_iter().map(|c| c.type_).collect();
        assert_eq!(types[0], "SchedulingDisabled");
        assert_eq!(n.active_conditions().len(), 3);
        let warn: Vec<String> = n.warning_conditions().into_iter().map(|c| c.type_).collect();
        assert_eq!(warn, vec!["MemoryPressure"]);
        assert_eq!(n.condition_text(), "Ready MemoryPressure");
    }

    #[test]
    fn capacity_and_info() {
        let n = node();
        assert_eq!(n.cpu_capacity(), 3.5);
        assert_eq!(n.memory_capacity(), 4.0 * 1024.0 * 1024.0 * 1024.0);
        assert_eq!(n.kubelet_version(), "v1.29.1");
        assert_eq!(n.operating_system(), "windows");

        let bare = Node::from_raw(json!({"metadata": {"uid": "n2", "name": "bare"}})).unwrap();
        assert_eq!(bare.kubelet_version(), "<unknown>");
        assert_eq!(bare.operating_system(), "linux");
        assert_eq!(bare.cpu_capacity(), 0.0);
        assert!(bare.conditions().is_empty());
    }
}
