use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use vela_core::LabelSelector;
use vela_model::{DaemonSet, Deployment, Job, KubeResource, Pod, PodStatusPhase, PodTemplated, ReplicaSet, StatefulSet};

use crate::join::{pods_by_owner, select};

/// Count of items per status category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusCounts(BTreeMap<PodStatusPhase, usize>);

impl StatusCounts {
    pub fn add(&mut self, phase: PodStatusPhase) { *self.0.entry(phase).or_default() += 1; }

    pub fn get(&self, phase: PodStatusPhase) -> usize { self.0.get(&phase).copied().unwrap_or(0) }

    pub fn total(&self) -> usize { self.0.values().sum() }

    /// Non-zero categories in display order.
    pub fn iter(&self) -> impl Iterator<Item = (PodStatusPhase, usize)> + '_ {
        PodStatusPhase::ALL.into_iter().filter_map(|p| self.0.get(&p).map(|n| (p, *n)))
    }
}

impl FromIterator<PodStatusPhase> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = PodStatusPhase>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for p in iter {
            counts.add(p);
        }
        counts
    }
}

/// Status of a workload derived from itself and the pods of its namespace.
pub trait WorkloadStatus: KubeResource {
    fn workload_status(&self, pods: &[Arc<Pod>]) -> PodStatusPhase;
}

// Failed wins over Pending, Pending over Running.
fn children_status(children: &[Arc<Pod>]) -> PodStatusPhase {
    let statuses: Vec<PodStatusPhase> = children.iter().map(|p| p.status()).collect();
    if statuses.contains(&PodStatusPhase::Failed) {
        PodStatusPhase::Failed
    } else if statuses.contains(&PodStatusPhase::Pending) {
        PodStatusPhase::Pending
    } else {
        PodStatusPhase::Running
    }
}

impl WorkloadStatus for Pod {
    fn workload_status(&self, _pods: &[Arc<Pod>]) -> PodStatusPhase { self.status() }
}

macro_rules! owned_pods_status {
    ($($ty:ty),+) => {$(
        impl WorkloadStatus for $ty {
            fn workload_status(&self, pods: &[Arc<Pod>]) -> PodStatusPhase {
                children_status(&pods_by_owner(pods, self.id()))
            }
        }
    )+};
}

owned_pods_status!(DaemonSet, StatefulSet, ReplicaSet);

impl WorkloadStatus for Deployment {
    // pods are matched by the template labels, not through the replica sets
    fn workload_status(&self, pods: &[Arc<Pod>]) -> PodStatusPhase {
        let sel = LabelSelector::from_labels(self.template().metadata.labels.clone());
        children_status(&select(pods, &sel, self.namespace()))
    }
}

impl WorkloadStatus for Job {
    fn workload_status(&self, pods: &[Arc<Pod>]) -> PodStatusPhase {
        if self.condition().map_or(false, |c| c.type_ == "Failed") {
            return PodStatusPhase::Failed;
        }
        let children: Vec<PodStatusPhase> = pods_by_owner(pods, self.id()).iter().map(|p| p.status()).collect();
        if children.contains(&PodStatusPhase::Pending) {
            PodStatusPhase::Pending
        } else if children.contains(&PodStatusPhase::Running) {
            PodStatusPhase::Running
        } else {
            PodStatusPhase::Succeeded
        }
    }
}

/// Count `items` by workload status.
pub fn statuses<'a, K, I>(items: I, pods: &[Arc<Pod>]) -> StatusCounts
where
    K: WorkloadStatus,
    I: IntoIterator<Item = &'a Arc<K>>,
{
    items.into_iter().map(|i| i.workload_status(pods)).collect()
}

pub fn pod_statuses<'a, I>(pods: I) -> StatusCounts
where
    I: IntoIterator<Item = &'a Arc<Pod>>,
{
    pods.into_iter().map(|p| p.status()).collect()
}
