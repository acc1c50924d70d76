use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use vela_model::{DaemonSet, Deployment, Job, KubeResource, Pod, ReplicaSet, StatefulSet};
use vela_store::{Namespaces, ObjectStore, StoreSignal};

use crate::status::{statuses, StatusCounts, WorkloadStatus};

/// Item count and status breakdown of one workload kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadOverview {
    pub kind: &'static str,
    pub count: usize,
    pub statuses: StatusCounts,
}

/// The stores behind the workloads overview.
#[derive(Clone)]
pub struct WorkloadStores {
    pub pods: ObjectStore<Pod>,
    pub deployments: ObjectStore<Deployment>,
    pub daemon_sets: ObjectStore<DaemonSet>,
    pub stateful_sets: ObjectStore<StatefulSet>,
    pub replica_sets: ObjectStore<ReplicaSet>,
    pub jobs: ObjectStore<Job>,
}

fn entry<K: WorkloadStatus>(store: &ObjectStore<K>, ns: &Namespaces, pods: &[Arc<Pod>]) -> WorkloadOverview {
    let items = store.get_by_namespaces(ns);
    WorkloadOverview { kind: K::KIND, count: items.len(), statuses: statuses(&items, pods) }
}

impl WorkloadStores {
    /// Change signals of every store, starting any that were idle.
    pub fn subscribe(&self) -> Vec<watch::Receiver<StoreSignal>> {
        vec![
            self.pods.subscribe(),
            self.deployments.subscribe(),
            self.daemon_sets.subscribe(),
            self.stateful_sets.subscribe(),
            self.replica_sets.subscribe(),
            self.jobs.subscribe(),
        ]
    }

    /// Per kind, the items within `ns` and their statuses. Child pods are looked up across
    /// all cached pods.
    pub fn overview(&self, ns: &Namespaces) -> Vec<WorkloadOverview> {
        let pods = self.pods.get_all();
        vec![
            entry(&self.pods, ns, &pods),
            entry(&self.deployments, ns, &pods),
            entry(&self.daemon_sets, ns, &pods),
            entry(&self.stateful_sets, ns, &pods),
            entry(&self.replica_sets, ns, &pods),
            entry(&self.jobs, ns, &pods),
        ]
    }
}
