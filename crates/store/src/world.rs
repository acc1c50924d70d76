use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use vela_core::{ConstructionError, Delta, DeltaKind, Uid};
use vela_model::KubeResource;

/// Namespace selection, used both as a store's sync scope and as a read filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Namespaces {
    #[default]
    All,
    Set(BTreeSet<String>),
}

impl Namespaces {
    pub fn set<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Namespaces::Set(names.into_iter().map(Into::into).collect())
    }

    /// Parse a comma separated list; empty input or `*` selects all namespaces.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Namespaces::All;
        }
        Self::set(s.split(',').map(str::trim).filter(|n| !n.is_empty()))
    }

    pub fn contains(&self, ns: Option<&str>) -> bool {
        match self {
            Namespaces::All => true,
            Namespaces::Set(set) => ns.map_or(false, |n| set.contains(n)),
        }
    }
}

/// Sync scope key: `None` is one cluster-wide list+watch.
pub(crate) type ScopeKey = Option<String>;

pub(crate) fn scope_keys<K: KubeResource>(ns: &Namespaces) -> Vec<ScopeKey> {
    match ns {
        _ if !K::SCOPE.is_namespaced() => vec![None],
        Namespaces::All => vec![None],
        Namespaces::Set(set) => set.iter().cloned().map(Some).collect(),
    }
}

/// Frozen view of one store's contents. Readers hold it through an `Arc` and never
/// observe a half-applied batch.
#[derive(Debug)]
pub struct StoreSnapshot<K> {
    pub epoch: u64,
    items: FxHashMap<Uid, Arc<K>>,
    by_ns: FxHashMap<String, FxHashSet<Uid>>,
}

impl<K> Default for StoreSnapshot<K> {
    fn default() -> Self {
        Self { epoch: 0, items: FxHashMap::default(), by_ns: FxHashMap::default() }
    }
}

impl<K: KubeResource> StoreSnapshot<K> {
    pub(crate) fn empty(epoch: u64) -> Self { Self { epoch, ..Self::default() } }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn get(&self, uid: &str) -> Option<&Arc<K>> { self.items.get(uid) }

    /// Every object, ordered by namespace then name.
    pub fn all(&self) -> Vec<Arc<K>> { sorted(self.items.values().cloned().collect()) }

    pub fn in_namespaces(&self, ns: &Namespaces) -> Vec<Arc<K>> {
        match ns {
            Namespaces::All => self.all(),
            Namespaces::Set(set) => {
                let out = set
                    .iter()
                    .filter_map(|n| self.by_ns.get(n))
                    .flatten()
                    .filter_map(|uid| self.items.get(uid).cloned())
                    .collect();
                sorted(out)
            }
        }
    }

    pub fn by_name(&self, name: &str, ns: Option<&str>) -> Option<&Arc<K>> {
        self.items.values().find(|o| o.name() == name && o.namespace() == ns)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<K>> { self.items.values() }
}

fn sorted<K: KubeResource>(mut v: Vec<Arc<K>>) -> Vec<Arc<K>> {
    v.sort_by(|a, b| (a.namespace(), a.name()).cmp(&(b.namespace(), b.name())));
    v
}

/// Outcome of applying one delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Upserted,
    Removed,
    /// Delete of a uid the store does not hold.
    Ignored,
}

/// Counts from re-seeding one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub applied: usize,
    pub removed: usize,
}

/// Mutable identity map owned by the applier; `freeze` publishes it.
pub struct WorldBuilder<K> {
    epoch: u64,
    items: FxHashMap<Uid, Arc<K>>,
    by_ns: FxHashMap<String, FxHashSet<Uid>>,
}

impl<K: KubeResource> Default for WorldBuilder<K> {
    fn default() -> Self { Self::new() }
}

impl<K: KubeResource> WorldBuilder<K> {
    pub fn new() -> Self { Self { epoch: 0, items: FxHashMap::default(), by_ns: FxHashMap::default() } }

    pub fn epoch(&self) -> u64 { self.epoch }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Whole-object replace by uid.
    pub fn upsert(&mut self, obj: K) {
        let uid = obj.id().to_string();
        if let Some(prev) = self.items.get(&uid) {
            if prev.namespace() != obj.namespace() {
                let prev_ns = prev.namespace().map(str::to_string);
                self.unindex(prev_ns.as_deref(), &uid);
            }
        }
        if let Some(ns) = obj.namespace() {
            self.by_ns.entry(ns.to_string()).or_default().insert(uid.clone());
        }
        self.items.insert(uid, Arc::new(obj));
    }

    pub fn remove(&mut self, uid: &str) -> Option<Arc<K>> {
        let prev = self.items.remove(uid)?;
        self.unindex(prev.namespace(), uid);
        Some(prev)
    }

    fn unindex(&mut self, ns: Option<&str>, uid: &str) {
        let Some(ns) = ns else { return };
        if let Some(set) = self.by_ns.get_mut(ns) {
            set.remove(uid);
            if set.is_empty() {
                self.by_ns.remove(ns);
            }
        }
    }

    /// Apply one watch delta. Deletes only need the uid, so a partial tombstone still
    /// removes its object.
    pub fn apply(&mut self, delta: Delta) -> Result<Applied, ConstructionError> {
        match delta.kind {
            DeltaKind::Added | DeltaKind::Modified => {
                self.upsert(K::from_raw(delta.raw)?);
                Ok(Applied::Upserted)
            }
            DeltaKind::Deleted => {
                let Some(uid) = delta.uid() else {
                    return Err(ConstructionError::MissingField { kind: K::KIND, field: "uid" });
                };
                Ok(match self.remove(uid) {
                    Some(_) => Applied::Removed,
                    None => Applied::Ignored,
                })
            }
        }
    }

    /// Replace exactly the objects of `scope` (`None` = everything) with `items`.
    pub fn reseed(&mut self, scope: Option<&str>, items: Vec<K>) -> SeedReport {
        let stale: Vec<Uid> = match scope {
            None => self.items.keys().cloned().collect(),
            Some(ns) => self.by_ns.get(ns).map(|s| s.iter().cloned().collect()).unwrap_or_default(),
        };
        let removed = stale.len();
        for uid in &stale {
            self.remove(uid);
        }
        let applied = items.len();
        for obj in items {
            self.upsert(obj);
        }
        SeedReport { applied, removed }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.by_ns.clear();
    }

    pub fn bump(&mut self) -> u64 {
        self.epoch = self.epoch.saturating_add(1);
        self.epoch
    }

    pub fn freeze(&self) -> Arc<StoreSnapshot<K>> {
        Arc::new(StoreSnapshot { epoch: self.epoch, items: self.items.clone(), by_ns: self.by_ns.clone() })
    }
}
