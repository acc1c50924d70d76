use std::sync::Arc;

use vela_core::LabelSelector;
use vela_model::{KubeResource, Pod};

/// Objects whose labels satisfy `selector`, optionally restricted to `namespace`.
/// An empty selector selects nothing.
pub fn select<'a, K, I>(objects: I, selector: &LabelSelector, namespace: Option<&str>) -> Vec<Arc<K>>
where
    K: KubeResource,
    I: IntoIterator<Item = &'a Arc<K>>,
{
    if selector.is_empty() {
        return Vec::new();
    }
    objects
        .into_iter()
        .filter(|o| namespace.map_or(true, |ns| o.namespace() == Some(ns)))
        .filter(|o| selector.matches(&o.meta().labels))
        .cloned()
        .collect()
}

/// Pods listing `owner_uid` among their owner references.
pub fn pods_by_owner<'a, I>(pods: I, owner_uid: &str) -> Vec<Arc<Pod>>
where
    I: IntoIterator<Item = &'a Arc<Pod>>,
{
    pods.into_iter().filter(|p| p.is_owned_by(owner_uid)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vela_core::{LabelSelectorRequirement, Labels, SelectorOperator};

    fn pod(name: &str, ns: &str, labels: serde_json::Value) -> Arc<Pod> {
        Arc::new(
            Pod::from_raw(json!({"metadata": {"uid": name, "name": name, "namespace": ns, "labels": labels}})).unwrap(),
        )
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels { pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }

    #[test]
    fn match_labels_subset() {
        let pods = vec![
            pod("web", "default", json!({"app": "x", "tier": "web"})),
            pod("db", "default", json!({"app": "y", "tier": "db"})),
        ];
        let sel = LabelSelector::from_labels(labels(&[("app", "x")]));
        let got = select(&pods, &sel, None);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name(), "web");

        let strict = LabelSelector::from_labels(labels(&[("app", "x"), ("tier", "db")]));
        assert!(select(&pods, &strict, None).is_empty());
    }

    #[test]
    fn empty_selector_matches_nothing() {
        let pods = vec![pod("web", "default", json!({"app": "x"}))];
        assert!(select(&pods, &LabelSelector::default(), None).is_empty());
    }

    #[test]
    fn expressions_and_namespace_filter() {
        let pods = vec![
            pod("a", "default", json!({"env": "prod"})),
            pod("b", "default", json!({})),
            pod("c", "other", json!({"env": "dev"})),
        ];
        let not_dev = LabelSelector {
            match_labels: Labels::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: "env".into(),
                operator: SelectorOperator::NotIn,
                values: vec!["dev".into()],
            }],
        };
        let names: Vec<_> = select(&pods, &not_dev, None).iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(select(&pods, &not_dev, Some("other")).len(), 0);
    }

    #[test]
    fn owner_join() {
        let owned = Arc::new(
            Pod::from_raw(json!({"metadata": {
                "uid": "p1", "name": "web-1", "namespace": "default",
                "ownerReferences": [{"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web", "uid": "rs-1"}]
            }}))
            .unwrap(),
        );
        let pods = vec![owned, pod("lonely", "default", json!({}))];
        let got = pods_by_owner(&pods, "rs-1");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name(), "web-1");
        assert!(pods_by_owner(&pods, "nope").is_empty());
    }
}
