use std::marker::PhantomData;
use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use tracing::warn;
use vela_core::{ApiBase, RawObject, TransportError};
use vela_model::{Deployment, KubeResource, ReplicaSet, StatefulSet};

use crate::{Patch, Transport};

/// Typed items of one list call.
#[derive(Debug, Clone)]
pub struct TypedList<K> {
    pub items: Vec<K>,
    pub resource_version: String,
    /// Items that failed construction and were dropped.
    pub skipped: usize,
}

/// Typed view of one kind over a shared transport.
pub struct ResourceApi<K> {
    transport: Arc<dyn Transport>,
    base: ApiBase,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ResourceApi<K> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone(), base: self.base.clone(), _kind: PhantomData }
    }
}

fn decode_err(e: vela_core::ConstructionError) -> TransportError {
    TransportError::Decode(e.to_string())
}

impl<K: KubeResource> ResourceApi<K> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, base: K::api_base(), _kind: PhantomData }
    }

    pub fn base(&self) -> &ApiBase { &self.base }

    pub fn transport(&self) -> &Arc<dyn Transport> { &self.transport }

    /// List and construct items; malformed ones are logged, counted and skipped.
    pub async fn list(&self, ns: Option<&str>) -> Result<TypedList<K>, TransportError> {
        let snap = self.transport.list(&self.base, ns).await?;
        let mut items = Vec::with_capacity(snap.items.len());
        let mut skipped = 0usize;
        for raw in snap.items {
            match K::from_raw(raw) {
                Ok(obj) => items.push(obj),
                Err(e) => {
                    skipped += 1;
                    warn!(kind = K::KIND, error = %e, "kubehub: skipping malformed list item");
                }
            }
        }
        if skipped > 0 {
            counter!("store_skipped_objects_total", skipped as u64, "kind" => K::KIND);
        }
        Ok(TypedList { items, resource_version: snap.resource_version, skipped })
    }

    pub async fn get(&self, ns: Option<&str>, name: &str) -> Result<K, TransportError> {
        let raw = self.transport.get(&self.base, ns, name).await?;
        K::from_raw(raw).map_err(decode_err)
    }

    pub async fn patch(&self, ns: Option<&str>, name: &str, patch: &Patch) -> Result<K, TransportError> {
        let raw = self.transport.patch(&self.base, ns, name, patch).await?;
        K::from_raw(raw).map_err(decode_err)
    }

    /// Replace `obj` with its current contents; the server checks `resourceVersion`.
    pub async fn update(&self, obj: &K) -> Result<K, TransportError> {
        let body = serde_json::to_value(obj).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let raw = self.transport.update(&self.base, obj.namespace(), obj.name(), &body).await?;
        K::from_raw(raw).map_err(decode_err)
    }

    /// Delete by name; returns the server's response (the object or a Status).
    pub async fn delete(&self, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError> {
        self.transport.delete(&self.base, ns, name).await
    }
}

/// Kinds served with a `/scale` subresource.
pub trait Scalable: KubeResource {}

impl Scalable for StatefulSet {}
impl Scalable for Deployment {}
impl Scalable for ReplicaSet {}

impl<K: Scalable> ResourceApi<K> {
    /// Set `spec.replicas` through the `scale` subresource.
    pub async fn scale(&self, ns: &str, name: &str, replicas: i32) -> Result<RawObject, TransportError> {
        let patch = Patch::Merge(json!({"spec": {"replicas": replicas}}));
        self.transport.patch_subresource(&self.base, Some(ns), name, "scale", &patch).await
    }
}
