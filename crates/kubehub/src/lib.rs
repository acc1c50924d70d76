//! Vela kubehub: transport to the API server (list, get, watch, mutations)

#![forbid(unsafe_code)]

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use vela_core::{ApiBase, Delta, ListSnapshot, RawObject, TransportError};

mod client;
mod mock;
mod resource;

pub use client::{watch_timeout_from_env, KubeTransport};
pub use mock::{Call, MockTransport, WatchFeed};
pub use resource::{ResourceApi, Scalable, TypedList};

/// Watch events for one collection, ending cleanly on server timeout or with
/// `TransportError::WatchClosed` on reset / ERROR frames.
pub type DeltaStream = BoxStream<'static, Result<Delta, TransportError>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// `application/merge-patch+json`
    Merge(Value),
    /// `application/strategic-merge-patch+json`
    Strategic(Value),
}

impl Patch {
    pub fn body(&self) -> &Value {
        match self {
            Patch::Merge(v) | Patch::Strategic(v) => v,
        }
    }
}

/// Access to one API server. Paths are built from an `ApiBase` plus an optional namespace;
/// no caching happens at this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn list(&self, base: &ApiBase, ns: Option<&str>) -> Result<ListSnapshot, TransportError>;

    async fn get(&self, base: &ApiBase, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError>;

    /// Open a watch starting after `since` (a list or event resourceVersion).
    async fn watch(&self, base: &ApiBase, ns: Option<&str>, since: &str) -> Result<DeltaStream, TransportError>;

    async fn patch(&self, base: &ApiBase, ns: Option<&str>, name: &str, patch: &Patch) -> Result<RawObject, TransportError>;

    async fn patch_subresource(
        &self,
        base: &ApiBase,
        ns: Option<&str>,
        name: &str,
        subresource: &str,
        patch: &Patch,
    ) -> Result<RawObject, TransportError>;

    async fn update(&self, base: &ApiBase, ns: Option<&str>, name: &str, body: &RawObject) -> Result<RawObject, TransportError>;

    async fn delete(&self, base: &ApiBase, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError>;
}

/// Split a raw list response into items and the list resourceVersion.
pub fn parse_list(body: Value) -> Result<ListSnapshot, TransportError> {
    let Value::Object(mut map) = body else {
        return Err(TransportError::Decode("list body is not an object".into()));
    };
    let resource_version = map
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TransportError::Decode("list body has no metadata.resourceVersion".into()))?;
    let items = match map.remove("items") {
        Some(Value::Array(items)) => items,
        // the server sends `"items": null` for empty lists
        Some(Value::Null) => Vec::new(),
        _ => return Err(TransportError::Decode("list body has no items array".into())),
    };
    Ok(ListSnapshot { items, resource_version })
}
