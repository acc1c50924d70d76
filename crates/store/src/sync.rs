use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use futures::StreamExt;
use metrics::{counter, gauge};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vela_core::{Delta, TransportError};
use vela_kubehub::ResourceApi;
use vela_model::KubeResource;

use crate::world::{Applied, ScopeKey, StoreSnapshot, WorldBuilder};
use crate::{Backoff, StoreConfig, StoreSignal, SyncState};

// upper bound on messages folded into one published snapshot
const MAX_BATCH: usize = 512;
// consecutive watches ending without a single event before the scope is re-listed
const MAX_EMPTY_WATCHES: u32 = 5;

/// Messages from the sync tasks (and control calls) to the applier.
pub(crate) enum Ingest<K> {
    Reset { generation: u64, scopes: Vec<ScopeKey> },
    Seed { generation: u64, scope: ScopeKey, items: Vec<K> },
    Event { generation: u64, delta: Delta },
    State { generation: u64, scope: ScopeKey, state: SyncState },
}

impl<K> Ingest<K> {
    fn generation(&self) -> u64 {
        match self {
            Ingest::Reset { generation, .. }
            | Ingest::Seed { generation, .. }
            | Ingest::Event { generation, .. }
            | Ingest::State { generation, .. } => *generation,
        }
    }
}

fn combine(states: &FxHashMap<ScopeKey, SyncState>) -> SyncState {
    if let Some(err) = states.values().find(|s| matches!(s, SyncState::Error(_))) {
        return err.clone();
    }
    if states.values().all(|s| *s == SyncState::Synced) {
        return SyncState::Synced;
    }
    if states.values().any(|s| *s == SyncState::Syncing) {
        return SyncState::Syncing;
    }
    SyncState::Uninitialized
}

/// Single owner of the identity map: applies messages in receipt order and publishes
/// one frozen snapshot per drained batch.
pub(crate) async fn run_applier<K: KubeResource>(
    mut rx: mpsc::Receiver<Ingest<K>>,
    snap: Arc<ArcSwap<StoreSnapshot<K>>>,
    signal: Arc<watch::Sender<StoreSignal>>,
    root: CancellationToken,
    generation: u64,
    scopes: Vec<ScopeKey>,
) {
    let kind = K::KIND;
    let mut world = WorldBuilder::<K>::new();
    let mut generation = generation;
    let mut states: FxHashMap<ScopeKey, SyncState> =
        scopes.into_iter().map(|s| (s, SyncState::Uninitialized)).collect();
    let mut batch = Vec::with_capacity(MAX_BATCH);

    loop {
        let first = tokio::select! {
            biased;
            _ = root.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(m) => m,
                None => {
                    debug!(kind, "store: ingest channel closed");
                    break;
                }
            },
        };
        batch.push(first);
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(m) => batch.push(m),
                Err(_) => break,
            }
        }

        let t0 = Instant::now();
        let mut dirty = false;
        let mut applied = 0u64;
        for msg in batch.drain(..) {
            if let Ingest::Reset { generation: g, scopes } = msg {
                if g > generation {
                    generation = g;
                    world.clear();
                    states = scopes.into_iter().map(|s| (s, SyncState::Uninitialized)).collect();
                    dirty = true;
                }
                continue;
            }
            if msg.generation() != generation {
                continue;
            }
            match msg {
                Ingest::Seed { scope, items, .. } => {
                    let report = world.reseed(scope.as_deref(), items);
                    debug!(kind, ns = ?scope, applied = report.applied, removed = report.removed, "store: scope seeded");
                    dirty = true;
                }
                Ingest::Event { delta, .. } => match world.apply(delta) {
                    Ok(Applied::Ignored) => {}
                    Ok(_) => {
                        applied += 1;
                        dirty = true;
                    }
                    Err(e) => {
                        warn!(kind, error = %e, "store: skipping malformed watch object");
                        counter!("store_skipped_objects_total", 1u64, "kind" => kind);
                    }
                },
                Ingest::State { scope, state, .. } => {
                    states.insert(scope, state);
                }
                Ingest::Reset { .. } => {}
            }
        }

        if root.is_cancelled() {
            break;
        }
        if dirty {
            world.bump();
            snap.store(world.freeze());
            gauge!("store_objects", world.len() as f64, "kind" => kind);
        }
        if applied > 0 {
            counter!("store_events_applied_total", applied, "kind" => kind);
        }
        let state = if states.is_empty() { SyncState::Synced } else { combine(&states) };
        signal.send_replace(StoreSignal { epoch: world.epoch(), state });
        debug!(kind, epoch = world.epoch(), took_ms = t0.elapsed().as_millis() as u64, "store: batch applied");
    }

    // in-flight messages are discarded with the receiver
    let epoch = signal.borrow().epoch.max(world.epoch()) + 1;
    snap.store(Arc::new(StoreSnapshot::empty(epoch)));
    gauge!("store_objects", 0.0, "kind" => kind);
    signal.send_replace(StoreSignal { epoch, state: SyncState::Closed });
    info!(kind, "store: applier stopped");
}

/// Per-scope sync: list, seed, then watch from the cursor until cancelled.
pub(crate) struct ScopeWorker<K> {
    pub api: ResourceApi<K>,
    pub scope: ScopeKey,
    pub generation: u64,
    pub tx: mpsc::Sender<Ingest<K>>,
    pub token: CancellationToken,
    pub config: StoreConfig,
}

enum WatchEnd {
    Cancelled,
    Failed(TransportError),
    /// Too many watches in a row closed without delivering anything.
    Stale,
}

impl<K: KubeResource> ScopeWorker<K> {
    async fn send(&self, msg: Ingest<K>) -> bool { self.tx.send(msg).await.is_ok() }

    async fn report(&self, state: SyncState) -> bool {
        self.send(Ingest::State { generation: self.generation, scope: self.scope.clone(), state }).await
    }

    /// Returns false when cancelled during the sleep.
    async fn sleep(&self, backoff: &mut Backoff) -> bool {
        let delay = backoff.next_delay();
        debug!(kind = K::KIND, ns = ?self.scope, delay_ms = delay.as_millis() as u64, attempt = backoff.attempt(), "store: backing off");
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    pub(crate) async fn run(self) {
        let kind = K::KIND;
        let ns = self.scope.as_deref();
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        loop {
            if !self.report(SyncState::Syncing).await {
                return;
            }
            let t0 = Instant::now();
            let listed = tokio::select! {
                _ = self.token.cancelled() => return,
                r = self.api.list(ns) => r,
            };
            let list = match listed {
                Ok(list) => list,
                Err(e) => {
                    warn!(kind, ns = ?ns, error = %e, "store: list failed");
                    if !self.report(SyncState::Error(e)).await || !self.sleep(&mut backoff).await {
                        return;
                    }
                    continue;
                }
            };
            backoff.reset();
            counter!("store_relist_total", 1u64, "kind" => kind);
            info!(kind, ns = ?ns, items = list.items.len(), skipped = list.skipped, rv = %list.resource_version, took_ms = t0.elapsed().as_millis() as u64, "store: listed");

            let mut cursor = list.resource_version;
            let seeded = self.send(Ingest::Seed { generation: self.generation, scope: self.scope.clone(), items: list.items }).await;
            if !seeded || !self.report(SyncState::Synced).await {
                return;
            }

            let err = match self.watch_from(&mut cursor).await {
                WatchEnd::Cancelled => return,
                WatchEnd::Stale => {
                    info!(kind, ns = ?ns, cursor = %cursor, "store: watches keep closing empty; re-listing");
                    continue;
                }
                WatchEnd::Failed(e) => e,
            };
            warn!(kind, ns = ?ns, error = %err, cursor = %cursor, "store: watch failed; will re-list");
            if !self.report(SyncState::Error(err)).await || !self.sleep(&mut backoff).await {
                return;
            }
        }
    }

    /// Follow watches from `cursor`, re-opening after clean ends. Every re-open waits on a
    /// backoff that restarts whenever an event arrives.
    async fn watch_from(&self, cursor: &mut String) -> WatchEnd {
        let ns = self.scope.as_deref();
        let mut quiet = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        let mut empty = 0u32;
        loop {
            let opened = tokio::select! {
                _ = self.token.cancelled() => return WatchEnd::Cancelled,
                r = self.api.transport().watch(self.api.base(), ns, cursor.as_str()) => r,
            };
            let mut stream = match opened {
                Ok(s) => s,
                Err(e) => return WatchEnd::Failed(e),
            };
            let mut delivered = false;
            loop {
                let next = tokio::select! {
                    _ = self.token.cancelled() => return WatchEnd::Cancelled,
                    n = stream.next() => n,
                };
                match next {
                    Some(Ok(delta)) => {
                        delivered = true;
                        if let Some(rv) = delta.resource_version() {
                            *cursor = rv.to_string();
                        }
                        if !self.send(Ingest::Event { generation: self.generation, delta }).await {
                            return WatchEnd::Cancelled;
                        }
                    }
                    Some(Err(e)) => return WatchEnd::Failed(e),
                    None => break,
                }
            }
            if delivered {
                empty = 0;
                quiet.reset();
            } else {
                empty += 1;
                if empty >= MAX_EMPTY_WATCHES {
                    return WatchEnd::Stale;
                }
            }
            debug!(kind = K::KIND, ns = ?ns, cursor = %cursor, empty, "store: watch ended; resuming");
            if !self.sleep(&mut quiet).await {
                return WatchEnd::Cancelled;
            }
        }
    }
}
