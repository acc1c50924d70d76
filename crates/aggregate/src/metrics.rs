use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vela_model::{DaemonSet, Deployment, Job, KubeResource, PersistentVolumeClaim, Pod, ReplicaSet, StatefulSet};

const DEFAULT_INTERVAL_SECS: u64 = 60;

const POD_METRICS: &[&str] = &[
    "cpuUsage",
    "cpuRequests",
    "cpuLimits",
    "memoryUsage",
    "memoryRequests",
    "memoryLimits",
    "fsUsage",
    "fsWrites",
    "fsReads",
    "networkReceive",
    "networkTransmit",
];

const WORKLOAD_METRICS: &[&str] =
    &["cpuUsage", "memoryUsage", "fsUsage", "fsWrites", "fsReads", "networkReceive", "networkTransmit"];

const PVC_METRICS: &[&str] = &["diskUsage", "diskCapacity"];

const NODE_METRICS: &[&str] = &[
    "memoryUsage",
    "workloadMemoryUsage",
    "memoryCapacity",
    "memoryAllocatableCapacity",
    "cpuUsage",
    "cpuCapacity",
    "fsSize",
    "fsUsage",
];

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics provider unavailable: {0}")]
    Unavailable(String),
    #[error("metrics query failed: {0}")]
    Query(String),
    #[error("metrics response decode failed: {0}")]
    Decode(String),
}

/// One metric query; every metric of a request shares the same query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricQuery {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsRequest {
    /// Metric name to query.
    pub queries: BTreeMap<String, MetricQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl MetricsRequest {
    fn uniform(names: &[&str], query: MetricQuery, namespace: Option<String>) -> Self {
        let queries = names.iter().map(|n| (n.to_string(), query.clone())).collect();
        Self { queries, namespace }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.queries.keys().map(String::as_str) }
}

/// Provider answer keyed by the requested metric names; series are passed through untouched.
pub type MetricsResponse = BTreeMap<String, Value>;

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn query(&self, request: &MetricsRequest) -> Result<MetricsResponse, MetricsError>;
}

/// Pod-name pattern the metrics backend uses to find a workload's pods.
pub trait PodNamePattern: KubeResource {
    fn pod_name_pattern(&self) -> String;
}

impl PodNamePattern for Job {
    fn pod_name_pattern(&self) -> String { format!("{}-[[:alnum:]]{{5}}", self.name()) }
}

impl PodNamePattern for DaemonSet {
    fn pod_name_pattern(&self) -> String { format!("{}-[[:alnum:]]{{5}}", self.name()) }
}

impl PodNamePattern for ReplicaSet {
    fn pod_name_pattern(&self) -> String { format!("{}-[[:alnum:]]{{5}}", self.name()) }
}

impl PodNamePattern for Deployment {
    fn pod_name_pattern(&self) -> String { format!("{}-[[:alnum:]]{{9,}}-[[:alnum:]]{{5}}", self.name()) }
}

impl PodNamePattern for StatefulSet {
    fn pod_name_pattern(&self) -> String { format!("{}-[[:digit:]]+", self.name()) }
}

pub fn pods_request<'a, I>(pods: I, namespace: &str) -> MetricsRequest
where
    I: IntoIterator<Item = &'a Arc<Pod>>,
{
    let names: Vec<&str> = pods.into_iter().map(|p| p.name()).collect();
    let query = MetricQuery {
        category: "pods".into(),
        pods: Some(names.join("|")),
        namespace: Some(namespace.to_string()),
        selector: Some("pod, namespace".into()),
        pvc: None,
    };
    MetricsRequest::uniform(POD_METRICS, query, Some(namespace.to_string()))
}

pub fn workloads_request<'a, K, I>(items: I, namespace: &str) -> MetricsRequest
where
    K: PodNamePattern,
    I: IntoIterator<Item = &'a Arc<K>>,
{
    let patterns: Vec<String> = items.into_iter().map(|i| i.pod_name_pattern()).collect();
    let query = MetricQuery {
        category: "pods".into(),
        pods: Some(patterns.join("|")),
        namespace: Some(namespace.to_string()),
        selector: Some(String::new()),
        pvc: None,
    };
    MetricsRequest::uniform(WORKLOAD_METRICS, query, Some(namespace.to_string()))
}

pub fn pvc_request(pvc: &PersistentVolumeClaim) -> MetricsRequest {
    let namespace = pvc.namespace().map(str::to_string);
    let query = MetricQuery {
        category: "pvc".into(),
        pvc: Some(pvc.name().to_string()),
        namespace: namespace.clone(),
        ..MetricQuery::default()
    };
    MetricsRequest::uniform(PVC_METRICS, query, namespace)
}

pub fn nodes_request() -> MetricsRequest {
    MetricsRequest::uniform(NODE_METRICS, MetricQuery { category: "nodes".into(), ..MetricQuery::default() }, None)
}

/// `VELA_METRICS_INTERVAL_SECS`, default 60.
pub fn interval_from_env() -> Duration {
    let secs = std::env::var("VELA_METRICS_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Re-runs a metrics request on a fixed interval and keeps the latest answer.
/// A failed refresh keeps the previous answer.
pub struct MetricsPoller {
    rx: watch::Receiver<Option<Arc<MetricsResponse>>>,
    token: CancellationToken,
}

impl MetricsPoller {
    /// Start polling; `build` is called before every refresh so the request follows the
    /// current store contents. Must run inside a tokio runtime.
    pub fn spawn<F>(provider: Arc<dyn MetricsProvider>, interval: Duration, build: F) -> Self
    where
        F: Fn() -> MetricsRequest + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let token = CancellationToken::new();
        let stop = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let request = build();
                        match provider.query(&request).await {
                            Ok(resp) => {
                                debug!(metrics = resp.len(), "aggregate: metrics refreshed");
                                tx.send_replace(Some(Arc::new(resp)));
                            }
                            Err(e) => warn!(error = %e, "aggregate: metrics refresh failed"),
                        }
                    }
                }
            }
            debug!("aggregate: metrics poller stopped");
        });
        Self { rx, token }
    }

    pub fn latest(&self) -> Option<Arc<MetricsResponse>> { self.rx.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MetricsResponse>>> { self.rx.clone() }

    pub fn stop(&self) { self.token.cancel(); }
}

impl Drop for MetricsPoller {
    fn drop(&mut self) { self.token.cancel(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj<K: KubeResource>(name: &str) -> Arc<K> {
        Arc::new(K::from_raw(json!({"metadata": {"uid": name, "name": name, "namespace": "default"}})).unwrap())
    }

    #[test]
    fn pod_selectors() {
        let pods: Vec<Arc<Pod>> = vec![obj("web-1"), obj("web-2")];
        let req = pods_request(&pods, "default");
        assert_eq!(req.queries.len(), 11);
        let q = &req.queries["cpuLimits"];
        assert_eq!(q.pods.as_deref(), Some("web-1|web-2"));
        assert_eq!(q.selector.as_deref(), Some("pod, namespace"));
        assert_eq!(
            serde_json::to_value(q).unwrap(),
            json!({"category": "pods", "pods": "web-1|web-2", "namespace": "default", "selector": "pod, namespace"})
        );
    }

    #[test]
    fn workload_patterns() {
        let deps: Vec<Arc<Deployment>> = vec![obj("api"), obj("ui")];
        let req = workloads_request(&deps, "prod");
        assert_eq!(req.queries.len(), 7);
        assert_eq!(
            req.queries["networkTransmit"].pods.as_deref(),
            Some("api-[[:alnum:]]{9,}-[[:alnum:]]{5}|ui-[[:alnum:]]{9,}-[[:alnum:]]{5}")
        );
        assert_eq!(req.queries["fsReads"].selector.as_deref(), Some(""));

        let sts: Vec<Arc<StatefulSet>> = vec![obj("pg")];
        assert_eq!(workloads_request(&sts, "db").queries["cpuUsage"].pods.as_deref(), Some("pg-[[:digit:]]+"));
        let jobs: Vec<Arc<Job>> = vec![obj("migrate")];
        assert_eq!(workloads_request(&jobs, "db").queries["cpuUsage"].pods.as_deref(), Some("migrate-[[:alnum:]]{5}"));
    }

    #[test]
    fn pvc_and_node_queries() {
        let pvc: Arc<PersistentVolumeClaim> = obj("data");
        let req = pvc_request(&pvc);
        assert_eq!(req.names().collect::<Vec<_>>(), vec!["diskCapacity", "diskUsage"]);
        assert_eq!(
            serde_json::to_value(&req.queries["diskUsage"]).unwrap(),
            json!({"category": "pvc", "namespace": "default", "pvc": "data"})
        );
        let nodes = nodes_request();
        assert_eq!(nodes.queries.len(), 8);
        assert_eq!(serde_json::to_value(&nodes.queries["fsSize"]).unwrap(), json!({"category": "nodes"}));
        assert!(nodes.namespace.is_none());
    }
}
