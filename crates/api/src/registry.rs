use std::sync::Arc;

use rustc_hash::FxHashMap;
use vela_model::{find_kind, KubeResource};
use vela_store::{ManagedStore, Namespaces, ObjectStore};

/// Every store of one connection, addressable by type or by kind name.
#[derive(Default, Clone)]
pub struct StoreRegistry {
    by_kind: FxHashMap<&'static str, Arc<dyn ManagedStore>>,
    order: Vec<&'static str>,
}

impl StoreRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register `store`, replacing any earlier store of the same kind.
    pub fn register<K: KubeResource>(&mut self, store: ObjectStore<K>) {
        if self.by_kind.insert(K::KIND, Arc::new(store)).is_none() {
            self.order.push(K::KIND);
        }
    }

    pub fn get<K: KubeResource>(&self) -> Option<ObjectStore<K>> {
        self.by_kind.get(K::KIND)?.as_any().downcast_ref::<ObjectStore<K>>().cloned()
    }

    /// Lookup by kind or plural resource name, case-insensitive.
    pub fn get_dyn(&self, name: &str) -> Option<Arc<dyn ManagedStore>> {
        let info = find_kind(name)?;
        self.by_kind.get(info.kind).cloned()
    }

    /// Stores in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ManagedStore>> {
        self.order.iter().filter_map(|k| self.by_kind.get(k))
    }

    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    pub async fn reset_all(&self, ns: &Namespaces) {
        for store in self.iter() {
            store.reset(ns.clone()).await;
        }
    }

    pub fn close_all(&self) {
        for store in self.iter() {
            store.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_kubehub::MockTransport;
    use vela_model::{Node, Pod};
    use vela_store::StoreConfig;

    #[test]
    fn typed_and_named_lookup() {
        let t = Arc::new(MockTransport::new());
        let mut reg = StoreRegistry::new();
        reg.register(ObjectStore::<Pod>::new(t.clone(), StoreConfig::default()));
        reg.register(ObjectStore::<Node>::new(t, StoreConfig::default()));

        assert!(reg.get::<Pod>().is_some());
        assert!(reg.get::<vela_model::Secret>().is_none());
        assert_eq!(reg.get_dyn("pods").map(|s| s.kind()), Some("Pod"));
        assert_eq!(reg.get_dyn("NODE").map(|s| s.kind()), Some("Node"));
        assert!(reg.get_dyn("widgets").is_none());
        let kinds: Vec<_> = reg.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec!["Pod", "Node"]);
    }

    #[test]
    fn typed_handle_shares_the_registered_store() {
        let t = Arc::new(MockTransport::new());
        let mut reg = StoreRegistry::new();
        reg.register(ObjectStore::<Pod>::new(t, StoreConfig::default()));
        let pods = reg.get::<Pod>().unwrap();
        reg.close_all();
        assert_eq!(pods.state(), vela_store::SyncState::Closed);
    }
}
