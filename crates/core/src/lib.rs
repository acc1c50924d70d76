//! Vela core types: object identity, label maps, selectors, raw deltas and errors.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod error;
pub mod labels;
pub mod meta;
pub mod path;
pub mod selector;

pub use error::{ApiStatus, ConstructionError, PathError, TransportError};
pub use labels::Labels;
pub use meta::{ObjectMeta, OwnerReference};
pub use path::{ApiBase, Scope};
pub use selector::{LabelSelector, LabelSelectorRequirement, SelectorOperator};

/// Globally unique, immutable object identifier (`metadata.uid`).
pub type Uid = String;

/// Raw object as delivered by the API server.
pub type RawObject = serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Added,
    Modified,
    Deleted,
}

/// One watch event for a single kind, in server order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub kind: DeltaKind,
    pub raw: RawObject,
}

impl Delta {
    pub fn added(raw: RawObject) -> Self { Self { kind: DeltaKind::Added, raw } }
    pub fn modified(raw: RawObject) -> Self { Self { kind: DeltaKind::Modified, raw } }
    pub fn deleted(raw: RawObject) -> Self { Self { kind: DeltaKind::Deleted, raw } }

    /// `metadata.uid` of the carried object, if present and non-empty.
    pub fn uid(&self) -> Option<&str> {
        raw_meta_str(&self.raw, "uid")
    }

    pub fn resource_version(&self) -> Option<&str> {
        raw_meta_str(&self.raw, "resourceVersion")
    }
}

/// Result of a collection list call: the raw items plus the list's resourceVersion,
/// which becomes the watch cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListSnapshot {
    pub items: Vec<RawObject>,
    pub resource_version: String,
}

/// Reads a non-empty string field from `raw.metadata`.
pub fn raw_meta_str<'a>(raw: &'a RawObject, field: &str) -> Option<&'a str> {
    raw.get("metadata")
        .and_then(|m| m.get(field))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub mod prelude {
    pub use super::{
        ApiBase, ApiStatus, ConstructionError, Delta, DeltaKind, LabelSelector, Labels, ListSnapshot,
        ObjectMeta, OwnerReference, RawObject, Scope, TransportError, Uid,
    };
}
