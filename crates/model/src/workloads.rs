//! Pod-template workloads: Job, DaemonSet, StatefulSet, Deployment, ReplicaSet.

use serde::{Deserialize, Serialize};
use vela_core::LabelSelector;

use crate::common::{Condition, PodTemplateSpec, PodTemplated};
use crate::{kube_resource, KubeObject};

fn container_images(t: &PodTemplateSpec, with_init: bool) -> Vec<&str> {
    let mut out: Vec<&str> = t.spec.containers.iter().map(|c| c.image.as_str()).collect();
    if with_init {
        out.extend(t.spec.init_containers.iter().map(|c| c.image.as_str()));
    }
    out
}

macro_rules! pod_templated {
    ($ty:ty, optional_selector) => {
        impl PodTemplated for $ty {
            fn selector(&self) -> Option<&LabelSelector> { self.spec.selector.as_ref() }
            fn template(&self) -> &PodTemplateSpec { &self.spec.template }
        }
    };
    ($ty:ty) => {
        impl PodTemplated for $ty {
            fn selector(&self) -> Option<&LabelSelector> { Some(&self.spec.selector) }
            fn template(&self) -> &PodTemplateSpec { &self.spec.template }
        }
    };
}

// Job

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    pub template: PodTemplateSpec,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStatus {
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type Job = KubeObject<JobSpec, JobStatus>;

kube_resource!(Job, "Job", ("batch", "v1", "jobs"), Namespaced);
pod_templated!(Job, optional_selector);

impl Job {
    pub fn desired_completions(&self) -> i32 { self.spec.completions.unwrap_or(0) }

    pub fn completions(&self) -> i32 { self.status.as_ref().map_or(0, |s| s.succeeded) }

    pub fn parallelism(&self) -> Option<i32> { self.spec.parallelism }

    /// The first condition whose status is True.
    pub fn condition(&self) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| s.conditions.iter().find(|c| c.is_true()))
    }

    pub fn images(&self) -> Vec<&str> { container_images(&self.spec.template, false) }
}

// DaemonSet

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonSetSpec {
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonSetStatus {
    pub current_number_scheduled: i32,
    pub desired_number_scheduled: i32,
    pub number_available: i32,
    pub number_misscheduled: i32,
    pub number_ready: i32,
    pub updated_number_scheduled: i32,
    pub observed_generation: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type DaemonSet = KubeObject<DaemonSetSpec, DaemonSetStatus>;

kube_resource!(DaemonSet, "DaemonSet", ("apps", "v1", "daemonsets"), Namespaced);
pod_templated!(DaemonSet);

impl DaemonSet {
    /// Images of containers and init containers.
    pub fn images(&self) -> Vec<&str> { container_images(&self.spec.template, true) }
}

// StatefulSet

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatefulSetSpec {
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatefulSetStatus {
    pub observed_generation: i64,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub current_replicas: i32,
    pub updated_replicas: i32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type StatefulSet = KubeObject<StatefulSetSpec, StatefulSetStatus>;

kube_resource!(StatefulSet, "StatefulSet", ("apps", "v1", "statefulsets"), Namespaced);
pod_templated!(StatefulSet);

impl StatefulSet {
    pub fn replicas(&self) -> i32 { self.spec.replicas.unwrap_or(0) }
    pub fn images(&self) -> Vec<&str> { container_images(&self.spec.template, false) }
}

// Deployment

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
    pub paused: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStatus {
    pub observed_generation: i64,
    pub replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub unavailable_replicas: i32,
    pub conditions: Vec<Condition>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type Deployment = KubeObject<DeploymentSpec, DeploymentStatus>;

kube_resource!(Deployment, "Deployment", ("apps", "v1", "deployments"), Namespaced);
pod_templated!(Deployment);

impl Deployment {
    pub fn replicas(&self) -> i32 { self.spec.replicas.unwrap_or(0) }
    pub fn images(&self) -> Vec<&str> { container_images(&self.spec.template, false) }

    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or(&[])
    }
}

// ReplicaSet

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicaSetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicaSetStatus {
    pub replicas: i32,
    pub fully_labeled_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type ReplicaSet = KubeObject<ReplicaSetSpec, ReplicaSetStatus>;

kube_resource!(ReplicaSet, "ReplicaSet", ("apps", "v1", "replicasets"), Namespaced);
pod_templated!(ReplicaSet);

impl ReplicaSet {
    pub fn replicas(&self) -> i32 { self.spec.replicas.unwrap_or(0) }
    pub fn ready_replicas(&self) -> i32 { self.status.as_ref().map_or(0, |s| s.ready_replicas) }
    pub fn images(&self) -> Vec<&str> { container_images(&self.spec.template, false) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KubeResource;
    use serde_json::{json, Value};

    fn template() -> Value {
        json!({
            "metadata": {"labels": {"app": "db", "tier": "data"}},
            "spec": {
                "containers": [{"name": "pg", "image": "postgres:16"}],
                "initContainers": [{"name": "init", "image": "busybox"}],
                "nodeSelector": {"disk": "ssd"},
                "tolerations": [{"key": "dedicated", "operator": "Exists"}],
                "affinity": {"podAntiAffinity": {}}
            }
        })
    }

    fn raw(kind: &str, spec: Value, status: Value) -> Value {
        json!({"kind": kind, "metadata": {"uid": "w1", "name": "db", "namespace": "data"}, "spec": spec, "status": status})
    }

    #[test]
    fn stateful_set_accessors() {
        let s = StatefulSet::from_raw(raw(
            "StatefulSet",
            json!({"replicas": 3, "selector": {"matchLabels": {"app": "db"}}, "template": template()}),
            json!({}),
        ))
        .unwrap();
        assert_eq!(s.selectors(), vec!["app=db"]);
        assert_eq!(s.node_selectors(), vec!["disk=ssd"]);
        assert_eq!(s.template_labels(), vec!["app=db", "tier=data"]);
        assert_eq!(s.tolerations().len(), 1);
        assert_eq!(s.affinity_number(), 1);
        assert_eq!(s.replicas(), 3);
        assert_eq!(s.images(), vec!["postgres:16"]);
    }

    #[test]
    fn daemon_set_images_include_init() {
        let d = DaemonSet::from_raw(raw("DaemonSet", json!({"template": template()}), json!({}))).unwrap();
        assert_eq!(d.images(), vec!["postgres:16", "busybox"]);
        assert!(d.selectors().is_empty());
    }

    #[test]
    fn job_completions_and_condition() {
        let j = Job::from_raw(raw(
            "Job",
            json!({"completions": 5, "parallelism": 2, "template": template()}),
            json!({"succeeded": 4, "conditions": [{"type": "Suspended", "status": "False"}, {"type": "Failed", "status": "True"}]}),
        ))
        .unwrap();
        assert_eq!(j.desired_completions(), 5);
        assert_eq!(j.completions(), 4);
        assert_eq!(j.parallelism(), Some(2));
        assert_eq!(j.condition().map(|c| c.type_.as_str()), Some("Failed"));
        assert!(j.selectors().is_empty());

        let empty = Job::from_raw(raw("Job", json!({}), Value::Null)).unwrap();
        assert_eq!(empty.desired_completions(), 0);
        assert_eq!(empty.completions(), 0);
        assert!(empty.condition().is_none());
        assert_eq!(empty.affinity_number(), 0);
    }
}
