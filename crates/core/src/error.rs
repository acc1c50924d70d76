use std::fmt;

use serde::{Deserialize, Serialize};

/// Raised when a raw object cannot become a typed resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    #[error("cannot create a {kind} from a non-object value")]
    NotAnObject { kind: &'static str },
    #[error("cannot create a {kind} from an object without metadata")]
    MissingMetadata { kind: &'static str },
    #[error("cannot create a {kind}: metadata.{field} is missing or empty")]
    MissingField { kind: &'static str, field: &'static str },
    #[error("{kind} {name} is namespace-scoped but has no metadata.namespace")]
    MissingNamespace { kind: &'static str, name: String },
    #[error("{kind} {name} is cluster-scoped but carries namespace {namespace}")]
    UnexpectedNamespace { kind: &'static str, name: String, namespace: String },
    #[error("{kind} {name}: {reason}")]
    Malformed { kind: &'static str, name: String, reason: String },
    #[error("unknown kind: {0}")]
    UnknownKind(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("invalid api base: {0} (expect /api/<version>/<resource> or /apis/<group>/<version>/<resource>)")]
    InvalidApiBase(String),
}

/// Server-provided failure details, preserved as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}: {}", self.code, self.reason)
        } else {
            f.write_str(&self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("http {}: {}", .0.code, .0)]
    Http(ApiStatus),
    #[error("not_found: {0}")]
    NotFound(ApiStatus),
    #[error("forbidden: {0}")]
    Forbidden(ApiStatus),
    #[error("conflict: {0}")]
    Conflict(ApiStatus),
    #[error("decode: {0}")]
    Decode(String),
    #[error("watch closed: {0}")]
    WatchClosed(String),
    #[error("connect: {0}")]
    Connect(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Classify a non-2xx response by its status code.
    pub fn from_status(status: ApiStatus) -> Self {
        match status.code {
            404 => TransportError::NotFound(status),
            403 => TransportError::Forbidden(status),
            409 => TransportError::Conflict(status),
            _ => TransportError::Http(status),
        }
    }

    pub fn status(&self) -> Option<&ApiStatus> {
        match self {
            TransportError::Http(s)
            | TransportError::NotFound(s)
            | TransportError::Forbidden(s)
            | TransportError::Conflict(s) => Some(s),
            _ => None,
        }
    }
}
