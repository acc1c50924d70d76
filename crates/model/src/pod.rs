use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{Affinity, Condition, Container, IntOrString, PodSpec, Probe, Toleration, Volume};
use crate::{kube_resource, KubeObject, KubeResource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStateRunning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerStateWaiting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStateTerminated {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<ContainerStateRunning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ContainerStateWaiting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated: Option<ContainerStateTerminated>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ContainerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state: Option<ContainerState>,
    pub ready: bool,
    pub restart_count: u32,
    pub image: String,
    #[serde(rename = "imageID")]
    pub image_id: String,
    #[serde(rename = "containerID", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodIp {
    pub ip: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub conditions: Vec<Condition>,
    #[serde(rename = "hostIP", skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(rename = "podIP", skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    #[serde(rename = "podIPs")]
    pub pod_ips: Vec<PodIp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    pub init_container_statuses: Vec<ContainerStatus>,
    pub container_statuses: Vec<ContainerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type Pod = KubeObject<PodSpec, PodStatus>;

kube_resource!(Pod, "Pod", ("", "v1", "pods"), Namespaced);

/// Pod status category used for counting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PodStatusPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Evicted,
}

impl PodStatusPhase {
    pub const ALL: [PodStatusPhase; 5] = [
        PodStatusPhase::Running,
        PodStatusPhase::Pending,
        PodStatusPhase::Succeeded,
        PodStatusPhase::Failed,
        PodStatusPhase::Evicted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PodStatusPhase::Pending => "Pending",
            PodStatusPhase::Running => "Running",
            PodStatusPhase::Succeeded => "Succeeded",
            PodStatusPhase::Failed => "Failed",
            PodStatusPhase::Evicted => "Evicted",
        }
    }
}

impl fmt::Display for PodStatusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl Pod {
    pub fn containers(&self) -> &[Container] { &self.spec.containers }
    pub fn init_containers(&self) -> &[Container] { &self.spec.init_containers }

    pub fn all_containers(&self) -> Vec<&Container> {
        self.spec.containers.iter().chain(self.spec.init_containers.iter()).collect()
    }

    pub fn running_containers(&self) -> Vec<&Container> {
        let running: HashSet<&str> = self
            .container_statuses(true)
            .into_iter()
            .filter(|s| s.state.as_ref().map_or(false, |st| st.running.is_some()))
            .map(|s| s.name.as_str())
            .collect();
        self.all_containers().into_iter().filter(|c| running.contains(c.name.as_str())).collect()
    }

    pub fn container_statuses(&self, include_init: bool) -> Vec<&ContainerStatus> {
        let Some(status) = self.status.as_ref() else { return Vec::new() };
        let mut out: Vec<&ContainerStatus> = status.container_statuses.iter().collect();
        if include_init {
            out.extend(status.init_container_statuses.iter());
        }
        out
    }

    pub fn restarts_count(&self) -> u32 {
        self.status.as_ref().map_or(0, |s| s.container_statuses.iter().map(|c| c.restart_count).sum())
    }

    pub fn qos_class(&self) -> &str { self.status.as_ref().and_then(|s| s.qos_class.as_deref()).unwrap_or("") }
    pub fn reason(&self) -> &str { self.status.as_ref().and_then(|s| s.reason.as_deref()).unwrap_or("") }
    pub fn priority_class_name(&self) -> &str { self.spec.priority_class_name.as_deref().unwrap_or("") }
    pub fn status_phase(&self) -> Option<&str> { self.status.as_ref().and_then(|s| s.phase.as_deref()) }

    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or(&[])
    }

    /// Classification: Evicted, Failed, Succeeded, Running (only when Initialized
    /// and Ready are both True), otherwise Pending. First match wins.
    pub fn status(&self) -> PodStatusPhase {
        let phase = self.status_phase();
        let good = ["Initialized", "Ready"]
            .iter()
            .all(|t| self.conditions().iter().any(|c| c.type_ == *t && c.is_true()));
        if self.reason() == "Evicted" {
            return PodStatusPhase::Evicted;
        }
        match phase {
            Some("Failed") => PodStatusPhase::Failed,
            Some("Succeeded") => PodStatusPhase::Succeeded,
            Some("Running") if good => PodStatusPhase::Running,
            _ => PodStatusPhase::Pending,
        }
    }

    /// `Evicted`, `Terminating`, the raw phase, or `Waiting`.
    pub fn status_message(&self) -> String {
        if self.reason() == "Evicted" {
            return "Evicted".into();
        }
        if self.metadata.deletion_timestamp.is_some() {
            return "Terminating".into();
        }
        match self.status_phase() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => "Waiting".into(),
        }
    }

    pub fn volumes(&self) -> &[Volume] { &self.spec.volumes }

    /// Names of secrets mounted as volumes.
    pub fn secrets(&self) -> Vec<&str> {
        self.spec.volumes.iter().filter_map(|v| v.secret.as_ref()).map(|s| s.secret_name.as_str()).collect()
    }

    pub fn node_selectors(&self) -> Vec<String> { self.spec.node_selector.stringify_with(": ") }
    pub fn tolerations(&self) -> &[Toleration] { &self.spec.tolerations }
    pub fn affinity(&self) -> Option<&Affinity> { self.spec.affinity.as_ref() }
    pub fn affinity_number(&self) -> usize { self.affinity().map_or(0, Affinity::count) }

    pub fn has_issues(&self) -> bool {
        if self.conditions().iter().any(|c| c.type_ == "Ready" && !c.is_true()) {
            return true;
        }
        let crash_looping = self.container_statuses(true).iter().any(|s| {
            let reason = s.state.as_ref().and_then(|st| st.waiting.as_ref()).and_then(|w| w.reason.as_deref());
            matches!(reason, Some("CrashLookBackOff") | Some("CrashLoopBackOff"))
        });
        crash_looping || self.status_phase() != Some("Running")
    }

    pub fn liveness_probe(&self, container: &Container) -> Vec<String> {
        describe_probe(container, container.liveness_probe.as_ref())
    }

    pub fn readiness_probe(&self, container: &Container) -> Vec<String> {
        describe_probe(container, container.readiness_probe.as_ref())
    }

    pub fn startup_probe(&self, container: &Container) -> Vec<String> {
        describe_probe(container, container.startup_probe.as_ref())
    }

    pub fn node_name(&self) -> Option<&str> { self.spec.node_name.as_deref() }

    pub fn selected_node_os(&self) -> Option<&str> {
        let sel = &self.spec.node_selector;
        sel.get("kubernetes.io/os").or_else(|| sel.get("beta.kubernetes.io/os"))
    }

    pub fn ips(&self) -> Vec<&str> {
        self.status.as_ref().map(|s| s.pod_ips.iter().map(|p| p.ip.as_str()).collect()).unwrap_or_default()
    }

    /// Whether a pod volume references the claim `claim` (same namespace assumed).
    pub fn mounts_claim(&self, claim: &str) -> bool {
        self.spec.volumes.iter().any(|v| v.persistent_volume_claim.as_ref().map_or(false, |c| c.claim_name == claim))
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.meta().owner_references.iter().any(|o| o.uid == uid)
    }
}

fn describe_probe(container: &Container, probe: Option<&Probe>) -> Vec<String> {
    let Some(p) = probe else { return Vec::new() };
    let mut out = Vec::new();
    if let Some(http) = &p.http_get {
        let port = match &http.port {
            Some(IntOrString::Int(n)) => n.to_string(),
            // named ports resolve through the container's port list, falling back to the name
            Some(IntOrString::String(name)) => container
                .ports
                .iter()
                .find(|cp| cp.name.as_deref() == Some(name.as_str()))
                .map(|cp| cp.container_port.to_string())
                .unwrap_or_else(|| name.clone()),
            None => String::new(),
        };
        out.push("http-get".to_string());
        out.push(format!(
            "{}://{}:{}{}",
            http.scheme.as_deref().unwrap_or("HTTP").to_lowercase(),
            http.host.as_deref().unwrap_or(""),
            port,
            http.path.as_deref().unwrap_or("")
        ));
    }
    if let Some(exec) = &p.exec {
        out.push(format!("exec [{}]", exec.command.join(" ")));
    }
    if let Some(port) = p.tcp_socket.as_ref().and_then(|t| t.port.as_ref()) {
        out.push(format!("tcp-socket :{}", port));
    }
    out.push(format!("delay={}s", p.initial_delay_seconds.unwrap_or(0)));
    out.push(format!("timeout={}s", p.timeout_seconds.unwrap_or(0)));
    out.push(format!("period={}s", p.period_seconds.unwrap_or(0)));
    out.push(format!("#success={}", p.success_threshold.unwrap_or(0)));
    out.push(format!("#failure={}", p.failure_threshold.unwrap_or(0)));
    out
}
