use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use chrono::Utc;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;
use vela_core::{RawObject, TransportError};
use vela_kubehub::{Patch, ResourceApi, Transport};
use vela_model::KubeResource;

use crate::sync::{run_applier, Ingest, ScopeWorker};
use crate::world::{scope_keys, ScopeKey, StoreSnapshot};
use crate::{Namespaces, StoreConfig, StoreSignal, SyncState};

struct Control<K> {
    // taken by the applier on start
    rx: Option<mpsc::Receiver<Ingest<K>>>,
    started: bool,
    closed: bool,
    generation: u64,
    scope: Namespaces,
    workers: CancellationToken,
}

struct Inner<K> {
    api: ResourceApi<K>,
    config: StoreConfig,
    snap: Arc<ArcSwap<StoreSnapshot<K>>>,
    signal: Arc<watch::Sender<StoreSignal>>,
    tx: mpsc::Sender<Ingest<K>>,
    root: CancellationToken,
    control: Mutex<Control<K>>,
}

impl<K> Drop for Inner<K> {
    fn drop(&mut self) { self.root.cancel(); }
}

/// Cache of one kind, kept in sync with the API server.
///
/// Reads are served from an `ArcSwap` snapshot and never block on sync. Writes go
/// straight to the transport and never touch the cache; the resulting change arrives
/// through the watch like any other.
pub struct ObjectStore<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for ObjectStore<K> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<K: KubeResource> ObjectStore<K> {
    pub fn new(transport: Arc<dyn Transport>, config: StoreConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_cap.max(1));
        let (signal, _) = watch::channel(StoreSignal::default());
        let root = CancellationToken::new();
        let control = Control {
            rx: Some(rx),
            started: false,
            closed: false,
            generation: 0,
            scope: config.namespaces.clone(),
            workers: root.child_token(),
        };
        let inner = Inner {
            api: ResourceApi::new(transport),
            config,
            snap: Arc::new(ArcSwap::from_pointee(StoreSnapshot::default())),
            signal: Arc::new(signal),
            tx,
            root,
            control: Mutex::new(control),
        };
        Self { inner: Arc::new(inner) }
    }

    fn control(&self) -> MutexGuard<'_, Control<K>> {
        self.inner.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn kind(&self) -> &'static str { K::KIND }

    pub fn api(&self) -> &ResourceApi<K> { &self.inner.api }

    /// Begin syncing; no-op once started or after `close`. Must run inside a tokio runtime.
    pub fn start(&self) {
        let mut ctl = self.control();
        if ctl.started || ctl.closed {
            return;
        }
        let Some(rx) = ctl.rx.take() else { return };
        ctl.started = true;
        ctl.generation = 1;
        let scopes = scope_keys::<K>(&ctl.scope);
        info!(kind = K::KIND, scopes = scopes.len(), "store: starting");
        tokio::spawn(run_applier(
            rx,
            Arc::clone(&self.inner.snap),
            Arc::clone(&self.inner.signal),
            self.inner.root.clone(),
            ctl.generation,
            scopes.clone(),
        ));
        self.spawn_workers(&ctl, scopes);
    }

    fn spawn_workers(&self, ctl: &Control<K>, scopes: Vec<ScopeKey>) {
        for scope in scopes {
            let worker = ScopeWorker {
                api: self.inner.api.clone(),
                scope,
                generation: ctl.generation,
                tx: self.inner.tx.clone(),
                token: ctl.workers.clone(),
                config: self.inner.config.clone(),
            };
            tokio::spawn(worker.run());
        }
    }

    /// Change signal; the first subscription starts the sync.
    pub fn subscribe(&self) -> watch::Receiver<StoreSignal> {
        self.start();
        self.inner.signal.subscribe()
    }

    pub fn signal(&self) -> StoreSignal { self.inner.signal.borrow().clone() }

    pub fn state(&self) -> SyncState { self.inner.signal.borrow().state.clone() }

    pub fn epoch(&self) -> u64 { self.inner.signal.borrow().epoch }

    pub fn scope(&self) -> Namespaces { self.control().scope.clone() }

    pub fn snapshot(&self) -> Arc<StoreSnapshot<K>> { self.inner.snap.load_full() }

    pub fn get_all(&self) -> Vec<Arc<K>> { self.inner.snap.load().all() }

    /// Objects in the given namespaces; an empty set selects nothing.
    pub fn get_by_namespaces(&self, ns: &Namespaces) -> Vec<Arc<K>> { self.inner.snap.load().in_namespaces(ns) }

    pub fn get_by_id(&self, uid: &str) -> Option<Arc<K>> { self.inner.snap.load().get(uid).cloned() }

    pub fn get_by_name(&self, name: &str, ns: Option<&str>) -> Option<Arc<K>> {
        self.inner.snap.load().by_name(name, ns).cloned()
    }

    pub fn len(&self) -> usize { self.inner.snap.load().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Drop the contents, switch to `scope` and sync again from a fresh list.
    pub async fn reset(&self, scope: Namespaces) {
        let (generation, scopes) = {
            let mut ctl = self.control();
            if ctl.closed {
                return;
            }
            ctl.scope = scope;
            if ctl.started {
                ctl.workers.cancel();
                ctl.workers = self.inner.root.child_token();
                ctl.generation += 1;
                (ctl.generation, scope_keys::<K>(&ctl.scope))
            } else {
                (0, Vec::new())
            }
        };
        if generation == 0 {
            self.start();
            return;
        }
        info!(kind = K::KIND, generation, scopes = scopes.len(), "store: reset");
        if self.inner.tx.send(Ingest::Reset { generation, scopes: scopes.clone() }).await.is_err() {
            return;
        }
        let ctl = self.control();
        // a newer reset spawns its own workers
        if ctl.generation == generation && !ctl.closed {
            self.spawn_workers(&ctl, scopes);
        }
    }

    /// Cancel all sync work and drop the contents. Terminal.
    pub fn close(&self) {
        let mut ctl = self.control();
        if ctl.closed {
            return;
        }
        ctl.closed = true;
        ctl.rx = None;
        self.inner.root.cancel();
        let epoch = self.inner.signal.borrow().epoch + 1;
        self.inner.snap.store(Arc::new(StoreSnapshot::empty(epoch)));
        self.inner.signal.send_replace(StoreSignal { epoch, state: SyncState::Closed });
        info!(kind = K::KIND, "store: closed");
    }

    /// Read one object from the server, bypassing the cache.
    pub async fn fetch(&self, ns: Option<&str>, name: &str) -> Result<K, TransportError> {
        self.inner.api.get(ns, name).await
    }

    pub async fn patch(&self, ns: Option<&str>, name: &str, patch: &Patch) -> Result<K, TransportError> {
        self.inner.api.patch(ns, name, patch).await
    }

    pub async fn update(&self, obj: &K) -> Result<K, TransportError> { self.inner.api.update(obj).await }

    pub async fn delete(&self, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError> {
        self.inner.api.delete(ns, name).await
    }
}

/// Kind-independent listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub uid: String,
    pub resource_version: String,
    pub age: String,
}

/// Kind-erased view of a store, for registries holding many kinds.
pub trait ManagedStore: Send + Sync {
    fn kind(&self) -> &'static str;
    fn state(&self) -> SyncState;
    /// Current signal; unlike `subscribe` this never starts the store.
    fn signal(&self) -> StoreSignal;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    fn start(&self);
    fn close(&self);
    fn subscribe(&self) -> watch::Receiver<StoreSignal>;
    fn reset(&self, scope: Namespaces) -> BoxFuture<'_, ()>;
    fn summaries(&self, ns: &Namespaces) -> Vec<ObjectSummary>;
    /// Cached objects in their serialized form.
    fn values(&self, ns: &Namespaces) -> Vec<Value>;
    fn as_any(&self) -> &dyn Any;
}

impl<K: KubeResource> ManagedStore for ObjectStore<K> {
    fn kind(&self) -> &'static str { K::KIND }
    fn state(&self) -> SyncState { ObjectStore::state(self) }
    fn signal(&self) -> StoreSignal { ObjectStore::signal(self) }
    fn len(&self) -> usize { ObjectStore::len(self) }
    fn start(&self) { ObjectStore::start(self) }
    fn close(&self) { ObjectStore::close(self) }
    fn subscribe(&self) -> watch::Receiver<StoreSignal> { ObjectStore::subscribe(self) }
    fn reset(&self, scope: Namespaces) -> BoxFuture<'_, ()> { Box::pin(ObjectStore::reset(self, scope)) }

    fn summaries(&self, ns: &Namespaces) -> Vec<ObjectSummary> {
        let now = Utc::now();
        self.get_by_namespaces(ns)
            .iter()
            .map(|o| ObjectSummary {
                kind: K::KIND,
                namespace: o.namespace().map(str::to_string),
                name: o.name().to_string(),
                uid: o.id().to_string(),
                resource_version: o.resource_version().to_string(),
                age: o.age(now),
            })
            .collect()
    }

    fn values(&self, ns: &Namespaces) -> Vec<Value> {
        self.get_by_namespaces(ns).iter().filter_map(|o| serde_json::to_value(&**o).ok()).collect()
    }

    fn as_any(&self) -> &dyn Any { self }
}
