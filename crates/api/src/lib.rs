//! Vela cluster connection (in-process).
//!
//! `ClusterConnection` builds one store per supported kind over a single transport and
//! registers them in a `StoreRegistry`; frontends take stores from there.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;
use vela_aggregate::{WorkloadOverview, WorkloadStores};
use vela_kubehub::{KubeTransport, Transport};
use vela_model::{
    DaemonSet, Deployment, Endpoint, Job, KubeResource, Namespace, Node, PersistentVolumeClaim, Pod, ReplicaSet,
    Secret, StatefulSet,
};
use vela_store::{ManagedStore, Namespaces, ObjectStore, StoreConfig, SyncState};

mod registry;

pub use registry::StoreRegistry;

/// Per-store status exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub kind: &'static str,
    pub state: String,
    pub epoch: u64,
    pub objects: usize,
}

pub struct ClusterConnection {
    transport: Arc<dyn Transport>,
    registry: StoreRegistry,
    config: StoreConfig,
    closed: AtomicBool,
}

impl ClusterConnection {
    /// Build (but do not start) a store for every supported kind.
    pub fn new(transport: Arc<dyn Transport>, config: StoreConfig) -> Self {
        let mut registry = StoreRegistry::new();
        macro_rules! register {
            ($($ty:ty),+ $(,)?) => {$(
                registry.register(ObjectStore::<$ty>::new(Arc::clone(&transport), config.clone()));
            )+};
        }
        register!(
            Pod,
            Deployment,
            DaemonSet,
            StatefulSet,
            ReplicaSet,
            Job,
            Node,
            Namespace,
            Secret,
            Endpoint,
            PersistentVolumeClaim,
        );
        info!(stores = registry.len(), "api: connection ready");
        Self { transport, registry, config, closed: AtomicBool::new(false) }
    }

    /// Connect through the ambient kubeconfig or in-cluster service account.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let transport = KubeTransport::try_default().await.context("connecting to the cluster")?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn transport(&self) -> &Arc<dyn Transport> { &self.transport }

    pub fn registry(&self) -> &StoreRegistry { &self.registry }

    pub fn config(&self) -> &StoreConfig { &self.config }

    pub fn store<K: KubeResource>(&self) -> Result<ObjectStore<K>> {
        self.registry.get::<K>().ok_or_else(|| anyhow!("no store registered for {}", K::KIND))
    }

    /// Kind-erased store by kind or resource name (`pods`, `Deployment`).
    pub fn store_named(&self, name: &str) -> Result<Arc<dyn ManagedStore>> {
        self.registry.get_dyn(name).with_context(|| format!("unknown kind {name:?}"))
    }

    pub fn workloads(&self) -> Result<WorkloadStores> {
        Ok(WorkloadStores {
            pods: self.store()?,
            deployments: self.store()?,
            daemon_sets: self.store()?,
            stateful_sets: self.store()?,
            replica_sets: self.store()?,
            jobs: self.store()?,
        })
    }

    /// Counts and statuses per workload kind within `ns`, from the current cache.
    pub fn workloads_overview(&self, ns: &Namespaces) -> Result<Vec<WorkloadOverview>> {
        Ok(self.workloads()?.overview(ns))
    }

    /// Switch every store to `ns` and resync.
    pub async fn set_namespaces(&mut self, ns: Namespaces) {
        info!(ns = ?ns, "api: switching namespaces");
        self.config.namespaces = ns.clone();
        self.registry.reset_all(&ns).await;
    }

    pub fn statuses(&self) -> Vec<StoreStatus> {
        self.registry
            .iter()
            .map(|s| {
                let signal = s.signal();
                StoreStatus { kind: s.kind(), state: signal.state.to_string(), epoch: signal.epoch, objects: s.len() }
            })
            .collect()
    }

    /// True once every started store reached `Synced`.
    pub fn all_synced<'a>(&self, kinds: impl IntoIterator<Item = &'a str>) -> bool {
        kinds
            .into_iter()
            .filter_map(|k| self.registry.get_dyn(k))
            .all(|s| s.state() == SyncState::Synced)
    }

    /// Close every store. Runs once; dropping the connection closes it too.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.close_all();
        info!("api: connection closed");
    }

    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}

impl Drop for ClusterConnection {
    fn drop(&mut self) { self.close(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vela_kubehub::MockTransport;

    #[test]
    fn registers_every_supported_kind() {
        let conn = ClusterConnection::new(Arc::new(MockTransport::new()), StoreConfig::default());
        assert_eq!(conn.registry().len(), vela_model::KINDS.len());
        assert!(conn.store::<Pod>().is_ok());
        assert!(conn.store_named("persistentvolumeclaims").is_ok());
        assert!(conn.store_named("widgets").is_err());
        assert!(conn.workloads().is_ok());
    }

    #[test]
    fn statuses_do_not_start_stores() {
        let mock = MockTransport::new();
        let conn = ClusterConnection::new(Arc::new(mock.clone()), StoreConfig::default());
        let statuses = conn.statuses();
        assert_eq!(statuses.len(), vela_model::KINDS.len());
        assert!(statuses.iter().all(|s| s.state == "uninitialized" && s.epoch == 0 && s.objects == 0));
        assert!(mock.calls().is_empty());
        assert!(conn.registry().iter().all(|s| s.state() == SyncState::Uninitialized));
    }

    #[test]
    fn close_runs_once() {
        let conn = ClusterConnection::new(Arc::new(MockTransport::new()), StoreConfig::default());
        assert!(!conn.is_closed());
        conn.close();
        assert!(conn.is_closed());
        let epochs: Vec<_> = conn.statuses().into_iter().map(|s| s.epoch).collect();
        conn.close();
        assert_eq!(conn.statuses().into_iter().map(|s| s.epoch).collect::<Vec<_>>(), epochs);
        assert!(conn.statuses().iter().all(|s| s.state == "closed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overview_and_namespace_switch() {
        let mock = MockTransport::new();
        mock.push_list(
            "/api/v1/pods",
            "1",
            vec![json!({"metadata": {"uid": "a", "name": "a", "namespace": "default"}, "status": {"phase": "Pending"}})],
        );
        mock.push_list(
            "/api/v1/namespaces/kube-system/pods",
            "2",
            vec![json!({"metadata": {"uid": "k", "name": "k", "namespace": "kube-system"}})],
        );
        let mut conn = ClusterConnection::new(Arc::new(mock.clone()), StoreConfig::default());
        let pods = conn.store::<Pod>().unwrap();
        let mut rx = pods.subscribe();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !(pods.state().is_synced() && pods.len() == 1) {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        let ov = conn.workloads_overview(&Namespaces::All).unwrap();
        assert_eq!(ov[0].kind, "Pod");
        assert_eq!(ov[0].count, 1);

        conn.set_namespaces(Namespaces::set(["kube-system"])).await;
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !(pods.state().is_synced() && pods.get_by_id("k").is_some()) {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(conn.config().namespaces, Namespaces::set(["kube-system"]));

        conn.close();
        assert!(conn.statuses().iter().all(|s| s.state == "closed"));
    }
}
