#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use vela_core::TransportError;
use vela_kubehub::{MockTransport, Patch};
use vela_model::{KubeResource, Node, Pod};
use vela_store::{Namespaces, ObjectStore, StoreConfig, StoreSignal, SyncState};

const PODS: &str = "/api/v1/pods";

fn pod(name: &str, ns: &str, rv: &str) -> Value {
    json!({
        "kind": "Pod",
        "apiVersion": "v1",
        "metadata": {"uid": format!("uid-{name}"), "name": name, "namespace": ns, "resourceVersion": rv},
        "spec": {"containers": [{"name": "main", "image": "nginx:1"}]}
    })
}

fn config() -> StoreConfig {
    StoreConfig::default().with_backoff(Duration::from_millis(20), Duration::from_millis(100))
}

fn store<K: KubeResource>(mock: &MockTransport, config: StoreConfig) -> ObjectStore<K> {
    ObjectStore::new(Arc::new(mock.clone()), config)
}

async fn wait_until(rx: &mut watch::Receiver<StoreSignal>, mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("store did not reach the expected state");
}

async fn poll_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_then_events_replay_in_order() {
    let mock = MockTransport::new();
    mock.push_list(PODS, "100", vec![pod("a", "default", "100"), pod("b", "default", "100")]);
    let feed = mock.watch_feed(PODS);
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 2).await;

    let mut updated = pod("a", "default", "101");
    updated["spec"]["containers"][0]["image"] = json!("nginx:2");
    feed.modified(updated);
    feed.deleted(pod("b", "default", "102"));
    wait_until(&mut rx, || pods.get_by_id("uid-b").is_none()).await;

    let all = pods.get_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name(), "a");
    assert_eq!(all[0].resource_version(), "101");
    assert_eq!(all[0].containers()[0].image, "nginx:2");
    assert_eq!(mock.count("list", PODS), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_modified_and_unknown_delete_leave_contents_alone() {
    let mock = MockTransport::new();
    mock.push_list(PODS, "100", vec![pod("a", "default", "100")]);
    let feed = mock.watch_feed(PODS);
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 1).await;

    for _ in 0..3 {
        feed.modified(pod("a", "default", "101"));
    }
    feed.deleted(pod("ghost", "default", "102"));
    feed.added(pod("c", "default", "103"));
    wait_until(&mut rx, || pods.len() == 2).await;

    assert_eq!(pods.get_by_id("uid-a").unwrap().resource_version(), "101");
    assert!(pods.get_by_name("c", Some("default")).is_some());
    assert!(pods.get_by_name("c", Some("other")).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clean_watch_end_resumes_from_cursor_without_relist() {
    let mock = MockTransport::new();
    mock.push_list(PODS, "100", vec![pod("a", "default", "100")]);
    let first = mock.watch_feed(PODS);
    let second = mock.watch_feed(PODS);
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced()).await;

    first.modified(pod("a", "default", "105"));
    first.close();
    poll_until(|| mock.count("watch", PODS) >= 2).await;
    second.added(pod("c", "default", "106"));
    wait_until(&mut rx, || pods.len() == 2).await;

    let cursors: Vec<_> = mock.calls().into_iter().filter(|c| c.verb == "watch").filter_map(|c| c.since).collect();
    assert_eq!(cursors, vec!["100".to_string(), "105".to_string()]);
    assert_eq!(mock.count("list", PODS), 1);
    assert!(pods.state().is_synced());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_failure_keeps_data_and_recovers_through_relist() {
    let mock = MockTransport::new();
    mock.push_list(PODS, "100", vec![pod("a", "default", "100")]);
    mock.push_list(PODS, "200", vec![pod("a", "default", "150"), pod("c", "default", "200")]);
    let feed = mock.watch_feed(PODS);
    let cfg = StoreConfig::default().with_backoff(Duration::from_millis(300), Duration::from_secs(1));
    let pods = store::<Pod>(&mock, cfg);
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 1).await;

    feed.fail(TransportError::WatchClosed("410 Expired: too old resource version".into()));
    wait_until(&mut rx, || pods.state().is_error()).await;
    assert_eq!(pods.len(), 1, "contents stay readable while in error");
    assert!(matches!(pods.state(), SyncState::Error(TransportError::WatchClosed(_))));

    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 2).await;
    assert_eq!(pods.get_by_id("uid-a").unwrap().resource_version(), "150");
    assert_eq!(mock.count("list", PODS), 2);
    let last_watch = mock.calls().into_iter().filter(|c| c.verb == "watch").last().unwrap();
    assert_eq!(last_watch.since.as_deref(), Some("200"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_failure_retries_with_backoff() {
    let mock = MockTransport::new();
    mock.push_list_error(PODS, TransportError::Connect("connection refused".into()));
    mock.push_list(PODS, "7", vec![pod("a", "default", "7")]);
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 1).await;
    assert_eq!(mock.count("list", PODS), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_list_items_are_skipped() {
    let mock = MockTransport::new();
    mock.push_list(
        PODS,
        "100",
        vec![
            pod("a", "default", "100"),
            json!({"metadata": {"name": "no-uid", "namespace": "default"}}),
            json!({"metadata": {"uid": "u", "name": "bad", "namespace": "default"}, "spec": {"containers": 5}}),
        ],
    );
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced()).await;
    assert_eq!(pods.len(), 1);
    assert_eq!(pods.get_all()[0].name(), "a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn namespace_reads() {
    let mock = MockTransport::new();
    mock.push_list(
        PODS,
        "100",
        vec![pod("a", "default", "100"), pod("b", "default", "100"), pod("dns", "kube-system", "100")],
    );
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced()).await;

    assert!(pods.get_by_namespaces(&Namespaces::set(Vec::<String>::new())).is_empty());
    let names: Vec<_> =
        pods.get_by_namespaces(&Namespaces::set(["default"])).iter().map(|p| p.name().to_string()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(pods.get_by_namespaces(&Namespaces::All).len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn namespace_set_syncs_each_scope_and_reset_switches() {
    let mock = MockTransport::new();
    mock.push_list("/api/v1/namespaces/a/pods", "10", vec![pod("a1", "a", "10")]);
    mock.push_list("/api/v1/namespaces/b/pods", "20", vec![pod("b1", "b", "20"), pod("b2", "b", "20")]);
    let feed_a = mock.watch_feed("/api/v1/namespaces/a/pods");
    let pods = store::<Pod>(&mock, config().with_namespaces(Namespaces::set(["a", "b"])));
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 3).await;
    assert_eq!(mock.count("list", PODS), 0);

    feed_a.added(pod("a2", "a", "11"));
    wait_until(&mut rx, || pods.len() == 4).await;

    pods.reset(Namespaces::set(["b"])).await;
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 2).await;
    assert_eq!(pods.scope(), Namespaces::set(["b"]));
    assert!(pods.get_all().iter().all(|p| p.namespace() == Some("b")));
    assert_eq!(mock.count("list", "/api/v1/namespaces/b/pods"), 2);
    assert_eq!(mock.count("list", "/api/v1/namespaces/a/pods"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cluster_scoped_kinds_ignore_namespace_scope() {
    let mock = MockTransport::new();
    mock.push_list("/api/v1/nodes", "5", vec![json!({"metadata": {"uid": "n1", "name": "node-1"}})]);
    let nodes = store::<Node>(&mock, config().with_namespaces(Namespaces::set(["default"])));
    let mut rx = nodes.subscribe();
    wait_until(&mut rx, || nodes.state().is_synced() && nodes.len() == 1).await;
    assert_eq!(mock.count("list", "/api/v1/nodes"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_drops_contents_and_is_terminal() {
    let mock = MockTransport::new();
    mock.push_list(PODS, "100", vec![pod("a", "default", "100")]);
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.state().is_synced() && pods.len() == 1).await;
    let before = pods.epoch();

    pods.close();
    assert_eq!(pods.state(), SyncState::Closed);
    assert!(pods.is_empty());
    assert!(pods.get_by_id("uid-a").is_none());
    assert!(pods.epoch() > before);

    pods.start();
    pods.reset(Namespaces::All).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pods.state(), SyncState::Closed);
    assert!(pods.is_empty());
    assert_eq!(mock.count("list", PODS), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writes_go_to_the_server_not_the_cache() {
    let mock = MockTransport::new();
    let item = "/api/v1/namespaces/default/pods/a";
    mock.push_response("patch", item, Ok(pod("a", "default", "300")));
    mock.push_response("get", item, Ok(pod("a", "default", "300")));
    let pods = store::<Pod>(&mock, config());

    let patched = pods.patch(Some("default"), "a", &Patch::Merge(json!({"metadata": {"labels": {"x": "y"}}}))).await.unwrap();
    assert_eq!(patched.resource_version(), "300");
    assert_eq!(pods.fetch(Some("default"), "a").await.unwrap().name(), "a");
    assert!(matches!(pods.delete(Some("default"), "a").await, Err(TransportError::NotFound(_))));

    assert!(pods.is_empty());
    assert_eq!(pods.state(), SyncState::Uninitialized);
    assert_eq!(mock.count("list", PODS), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watches_closing_empty_back_off_and_relist() {
    let mock = MockTransport::new();
    mock.push_list(PODS, "100", vec![pod("a", "default", "100")]);
    for _ in 0..64 {
        mock.watch_feed(PODS).close();
    }
    let pods = store::<Pod>(&mock, config());
    let _rx = pods.subscribe();

    poll_until(|| mock.count("list", PODS) >= 2).await;
    let watches = mock.count("watch", PODS);
    assert!((5..=6).contains(&watches), "watch opened {watches} times before the re-list");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let lists = mock.count("list", PODS);
    assert!(mock.count("watch", PODS) <= 6 * lists, "watches not bounded by backoff");
    assert_eq!(pods.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_sends_back_fields_the_model_does_not_know() {
    let mock = MockTransport::new();
    let mut raw = pod("a", "default", "5");
    raw["metadata"]["generation"] = json!(4);
    raw["spec"]["dnsPolicy"] = json!("ClusterFirst");
    raw["spec"]["containers"][0]["env"] = json!([{"name": "MODE", "value": "prod"}]);
    raw["spec"]["containers"][0]["volumeMounts"] = json!([{"name": "data", "mountPath": "/data"}]);
    mock.push_list(PODS, "5", vec![raw.clone()]);
    let item = "/api/v1/namespaces/default/pods/a";
    mock.push_response("update", item, Ok(raw));
    let pods = store::<Pod>(&mock, config());
    let mut rx = pods.subscribe();
    wait_until(&mut rx, || pods.len() == 1).await;

    let mut cached = (*pods.get_by_id("uid-a").unwrap()).clone();
    cached.spec.containers[0].image = "nginx:2".into();
    pods.update(&cached).await.unwrap();

    let body = mock.calls().into_iter().find(|c| c.verb == "update").and_then(|c| c.body).unwrap();
    let container = &body["spec"]["containers"][0];
    assert_eq!(container["image"], "nginx:2");
    assert_eq!(container["env"], json!([{"name": "MODE", "value": "prod"}]));
    assert_eq!(container["volumeMounts"][0]["mountPath"], "/data");
    assert_eq!(body["spec"]["dnsPolicy"], "ClusterFirst");
    assert_eq!(body["metadata"]["generation"], 4);
}
