use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use rustc_hash::FxHashMap;
use serde_json::Value;
use vela_core::{ApiBase, ApiStatus, Delta, ListSnapshot, RawObject, TransportError};

use crate::{parse_list, DeltaStream, Patch, Transport};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub verb: &'static str,
    pub path: String,
    /// Watch cursor, for `watch` calls.
    pub since: Option<String>,
    pub body: Option<Value>,
}

type Script = VecDeque<Result<Value, TransportError>>;

#[derive(Default)]
struct MockState {
    lists: FxHashMap<String, Script>,
    watches: FxHashMap<String, VecDeque<mpsc::UnboundedReceiver<Result<Delta, TransportError>>>>,
    responses: FxHashMap<(&'static str, String), Script>,
    calls: Vec<Call>,
}

/// Scripted in-memory transport for tests and offline runs.
///
/// List responses are queued per collection path; the last queued response keeps being
/// served. Each `watch` call takes the next scripted feed, or blocks forever when none is
/// left. Mutations and `get` answer from per-(verb, path) queues and fail with NotFound
/// when nothing is scripted.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle feeding one scripted watch stream.
#[derive(Clone)]
pub struct WatchFeed {
    tx: mpsc::UnboundedSender<Result<Delta, TransportError>>,
}

impl WatchFeed {
    pub fn send(&self, delta: Delta) -> bool { self.tx.unbounded_send(Ok(delta)).is_ok() }
    pub fn added(&self, raw: Value) -> bool { self.send(Delta::added(raw)) }
    pub fn modified(&self, raw: Value) -> bool { self.send(Delta::modified(raw)) }
    pub fn deleted(&self, raw: Value) -> bool { self.send(Delta::deleted(raw)) }

    /// Deliver a transport failure; the consumer treats it as the end of the watch.
    pub fn fail(&self, err: TransportError) -> bool { self.tx.unbounded_send(Err(err)).is_ok() }

    /// End the stream cleanly, like a server-side watch timeout.
    pub fn close(&self) { self.tx.close_channel(); }
}

fn not_scripted(verb: &str, path: &str) -> TransportError {
    TransportError::NotFound(ApiStatus {
        code: 404,
        reason: "NotFound".into(),
        message: format!("no scripted response for {} {}", verb, path),
    })
}

impl MockTransport {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a raw list response body for `path` (e.g. `/api/v1/pods`).
    pub fn push_list_body(&self, path: impl Into<String>, body: Value) {
        self.state().lists.entry(path.into()).or_default().push_back(Ok(body));
    }

    /// Queue a list of `items` at `resource_version`.
    pub fn push_list(&self, path: impl Into<String>, resource_version: &str, items: Vec<Value>) {
        let body = serde_json::json!({"metadata": {"resourceVersion": resource_version}, "items": items});
        self.push_list_body(path, body);
    }

    pub fn push_list_error(&self, path: impl Into<String>, err: TransportError) {
        self.state().lists.entry(path.into()).or_default().push_back(Err(err));
    }

    /// Script the next watch opened on `path` and return its feed.
    pub fn watch_feed(&self, path: impl Into<String>) -> WatchFeed {
        let (tx, rx) = mpsc::unbounded();
        self.state().watches.entry(path.into()).or_default().push_back(rx);
        WatchFeed { tx }
    }

    /// Queue the result of the next `verb` (`get`, `patch`, `update`, `delete`) on `path`.
    /// Subresource patches are keyed by `{item path}/{subresource}`.
    pub fn push_response(&self, verb: &'static str, path: impl Into<String>, result: Result<Value, TransportError>) {
        self.state().responses.entry((verb, path.into())).or_default().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> { self.state().calls.clone() }

    pub fn count(&self, verb: &str, path: &str) -> usize {
        self.state().calls.iter().filter(|c| c.verb == verb && c.path == path).count()
    }

    fn record(&self, verb: &'static str, path: &str, since: Option<&str>, body: Option<&Value>) {
        self.state().calls.push(Call { verb, path: path.to_string(), since: since.map(str::to_string), body: body.cloned() });
    }

    fn respond(&self, verb: &'static str, path: String) -> Result<Value, TransportError> {
        let mut st = self.state();
        match st.responses.get_mut(&(verb, path.clone())).and_then(VecDeque::pop_front) {
            Some(res) => res,
            None => Err(not_scripted(verb, &path)),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list(&self, base: &ApiBase, ns: Option<&str>) -> Result<ListSnapshot, TransportError> {
        let path = base.collection_path(ns);
        self.record("list", &path, None, None);
        let next = {
            let mut st = self.state();
            match st.lists.get_mut(&path) {
                Some(q) if q.len() > 1 => q.pop_front(),
                Some(q) => q.front().cloned(),
                None => None,
            }
        };
        match next {
            Some(res) => parse_list(res?),
            None => Err(not_scripted("list", &path)),
        }
    }

    async fn get(&self, base: &ApiBase, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError> {
        let path = base.item_path(ns, name);
        self.record("get", &path, None, None);
        self.respond("get", path)
    }

    async fn watch(&self, base: &ApiBase, ns: Option<&str>, since: &str) -> Result<DeltaStream, TransportError> {
        let path = base.collection_path(ns);
        self.record("watch", &path, Some(since), None);
        let rx = self.state().watches.get_mut(&path).and_then(VecDeque::pop_front);
        Ok(match rx {
            Some(rx) => rx.boxed(),
            None => futures::stream::pending::<Result<Delta, TransportError>>().boxed(),
        })
    }

    async fn patch(&self, base: &ApiBase, ns: Option<&str>, name: &str, patch: &Patch) -> Result<RawObject, TransportError> {
        let path = base.item_path(ns, name);
        self.record("patch", &path, None, Some(patch.body()));
        self.respond("patch", path)
    }

    async fn patch_subresource(
        &self,
        base: &ApiBase,
        ns: Option<&str>,
        name: &str,
        subresource: &str,
        patch: &Patch,
    ) -> Result<RawObject, TransportError> {
        let path = format!("{}/{}", base.item_path(ns, name), subresource);
        self.record("patch", &path, None, Some(patch.body()));
        self.respond("patch", path)
    }

    async fn update(&self, base: &ApiBase, ns: Option<&str>, name: &str, body: &RawObject) -> Result<RawObject, TransportError> {
        let path = base.item_path(ns, name);
        self.record("update", &path, None, Some(body));
        self.respond("update", path)
    }

    async fn delete(&self, base: &ApiBase, ns: Option<&str>, name: &str) -> Result<RawObject, TransportError> {
        let path = base.item_path(ns, name);
        self.record("delete", &path, None, None);
        self.respond("delete", path)
    }
}
