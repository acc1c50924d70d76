//! Ordered string maps used for labels, annotations and selectors.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

/// Kubernetes labels as key/value pairs, kept in the source map's insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(SmallVec<[(String, String); 8]>);

impl Labels {
    pub fn new() -> Self { Self(SmallVec::new()) }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool { self.get(key).is_some() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.0.iter().map(|(k, _)| k.as_str()) }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// `"key=value"` strings in insertion order.
    pub fn stringify(&self) -> Vec<String> { self.stringify_with("=") }

    pub fn stringify_with(&self, sep: &str) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{}{}{}", k, sep, v)).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Labels::new();
        for (k, v) in iter { out.insert(k, v); }
        out
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

struct LabelsVisitor;

impl<'de> Visitor<'de> for LabelsVisitor {
    type Value = Labels;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of string keys to string values")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Labels, E> { Ok(Labels::new()) }

    fn visit_none<E: serde::de::Error>(self) -> Result<Labels, E> { Ok(Labels::new()) }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Labels, A::Error> {
        let mut out = Labels::new();
        while let Some((k, v)) = access.next_entry::<String, Option<String>>()? {
            // undefined/null values are dropped
            if let Some(v) = v { out.insert(k, v); }
        }
        Ok(out)
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LabelsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_source_order_when_decoding() {
        let l: Labels = serde_json::from_value(json!({"zeta": "1", "alpha": "2", "mid": null})).unwrap();
        assert_eq!(l.stringify(), vec!["zeta=1".to_string(), "alpha=2".to_string()]);
        assert_eq!(l.get("alpha"), Some("2"));
        assert!(!l.contains_key("mid"));
    }

    #[test]
    fn null_decodes_to_empty() {
        let l: Labels = serde_json::from_value(serde_json::Value::Null).unwrap();
        assert!(l.is_empty());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut l: Labels = [("a", "1"), ("b", "2")].into_iter().collect();
        l.insert("a", "3");
        assert_eq!(l.stringify_with(":"), vec!["a:3".to_string(), "b:2".to_string()]);
        assert_eq!(serde_json::to_value(&l).unwrap(), json!({"a": "3", "b": "2"}));
    }
}
