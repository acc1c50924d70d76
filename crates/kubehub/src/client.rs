use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use futures::{future, StreamExt};
use kube::api::{DeleteParams, GetParams, ListParams, Patch as KubePatch, PatchParams, PostParams, WatchEvent, WatchParams};
use kube::core::Request;
use kube::Client;
use metrics::histogram;
use serde_json::Value;
use tracing::{debug, info};
use vela_core::{ApiBase, ApiStatus, Delta, ListSnapshot, RawObject, TransportError};

use crate::{parse_list, DeltaStream, Patch, Transport};

const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;
// the API server rejects watch timeouts of 295s and above
const MAX_WATCH_TIMEOUT_SECS: u32 = 290;

pub fn watch_timeout_from_env() -> u32 {
    std::env::var("VELA_WATCH_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_WATCH_TIMEOUT_SECS)
        .min(MAX_WATCH_TIMEOUT_SECS)
}

/// `Transport` over a kube-rs `Client`, issuing raw requests against upstream paths.
#[derive(Clone)]
pub struct KubeTransport {
    client: Client,
    watch_timeout_secs: u32,
}

impl KubeTransport {
    pub fn new(client: Client) -> Self {
        Self { client, watch_timeout_secs: watch_timeout_from_env() }
    }

    /// Build from the ambient kubeconfig / in-cluster environment.
    pub async fn try_default() -> Result<Self, TransportError> {
        let client = Client::try_default().await.map_err(map_kube_error)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client { &self.client }

    fn request(base: &ApiBase, ns: Option<&str>) -> Request {
        Request::new(base.collection_path(ns))
    }
}

fn invalid(e: kube::core::request::Error) -> TransportError {
    TransportError::InvalidRequest(e.to_string())
}

pub(crate) fn map_kube_error(e: kube::Error) -> TransportError {
    match e {
        kube::Error::Api(resp) => TransportError::from_status(ApiStatus {
            code: resp.code,
            reason: resp.reason,
            message: resp.message,
        }),
        kube::Error::SerdeError(e) => TransportError::Decode(e.to_string()),
        kube::Error::BuildRequest(e) => TransportError::InvalidRequest(e.to_string()),
        other => TransportError::Connect(other.to_string()),
    }
}

fn kube_patch(patch: &Patch) -> KubePatch<&Value> {
    match patch {
        Patch::Merge(v) => KubePatch::Merge(v),
        Patch::Strategic(v) => KubePatch::Strategic(v),
    }
}

async fn timed<T>(verb: &'static str, fut: impl Future<Output = Result<T, kube::Error>>) -> Result<T, TransportError> {
    let t0 = Instant::now();
    let res = fut.await;
    histogram!("transport_request_ms", t0.elapsed().as_secs_f64() * 1000.0, "verb" => verb);
    if let Err(e) = &res {
        debug!(verb, error = %e, "kubehub: request failed");
    }
    res.map_err(map_kube_error)
}

#[async_trait]
impl Transport for KubeTransport {
    async fn list(&self, base: &ApiBase, ns: Option<&str>) -> Result<ListSnapshot, TransportError> {
        let req = Self::request(base, ns).list(&ListParams::default()).map_err(invalid)?;
        let body: Value = timed("list", self.client.request::<Value>(req)).await?;
        let snap = parse_list(body)?;
        debug!(path = %base.collection_path(ns), items = snap.items.len(), rv = %snap.resource_version, "kubehub: list");
        Ok(snap)
    }

    async fn get(&self, base: &ApiBase, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError> {
        let req = Self::request(base, ns).get(name, &GetParams::default()).map_err(invalid)?;
        timed("get", self.client.request::<Value>(req)).await
    }

    async fn watch(&self, base: &ApiBase, ns: Option<&str>, since: &str) -> Result<DeltaStream, TransportError> {
        let wp = WatchParams::default().timeout(self.watch_timeout_secs);
        let req = Self::request(base, ns).watch(&wp, since).map_err(invalid)?;
        let events = timed("watch", self.client.request_events::<Value>(req)).await?;
        info!(path = %base.collection_path(ns), since, "kubehub: watch opened");
        let stream = events.filter_map(|ev| {
            future::ready(match ev {
                Ok(WatchEvent::Added(o)) => Some(Ok(Delta::added(o))),
                Ok(WatchEvent::Modified(o)) => Some(Ok(Delta::modified(o))),
                Ok(WatchEvent::Deleted(o)) => Some(Ok(Delta::deleted(o))),
                Ok(WatchEvent::Bookmark(_)) => None,
                Ok(WatchEvent::Error(e)) => {
                    Some(Err(TransportError::WatchClosed(format!("{} {}: {}", e.code, e.reason, e.message))))
                }
                Err(e) => Some(Err(TransportError::WatchClosed(e.to_string()))),
            })
        });
        Ok(stream.boxed())
    }

    async fn patch(&self, base: &ApiBase, ns: Option<&str>, name: &str, patch: &Patch) -> Result<RawObject, TransportError> {
        let req = Self::request(base, ns).patch(name, &PatchParams::default(), &kube_patch(patch)).map_err(invalid)?;
        timed("patch", self.client.request::<Value>(req)).await
    }

    async fn patch_subresource(
        &self,
        base: &ApiBase,
        ns: Option<&str>,
        name: &str,
        subresource: &str,
        patch: &Patch,
    ) -> Result<RawObject, TransportError> {
        let req = Self::request(base, ns)
            .patch_subresource(subresource, name, &PatchParams::default(), &kube_patch(patch))
            .map_err(invalid)?;
        timed("patch", self.client.request::<Value>(req)).await
    }

    async fn update(&self, base: &ApiBase, ns: Option<&str>, name: &str, body: &RawObject) -> Result<RawObject, TransportError> {
        let data = serde_json::to_vec(body).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let req = Self::request(base, ns).replace(name, &PostParams::default(), data).map_err(invalid)?;
        timed("update", self.client.request::<Value>(req)).await
    }

    async fn delete(&self, base: &ApiBase, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError> {
        let req = Self::request(base, ns).delete(name, &DeleteParams::default()).map_err(invalid)?;
        timed("delete", self.client.request::<Value>(req)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_status_fields() {
        let e = map_kube_error(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "pods \"web\" is forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        }));
        match e {
            TransportError::Forbidden(s) => {
                assert_eq!(s.code, 403);
                assert_eq!(s.reason, "Forbidden");
                assert_eq!(s.message, "pods \"web\" is forbidden");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn watch_timeout_is_capped() {
        assert!(watch_timeout_from_env() <= MAX_WATCH_TIMEOUT_SECS);
    }
}
