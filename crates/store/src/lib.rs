//! Vela store: per-kind object cache kept in sync by list+watch

#![forbid(unsafe_code)]

use std::fmt;

use vela_core::TransportError;

mod backoff;
mod config;
mod store;
mod sync;
mod world;

pub use backoff::Backoff;
pub use config::StoreConfig;
pub use store::{ManagedStore, ObjectStore, ObjectSummary};
pub use world::{Applied, Namespaces, SeedReport, StoreSnapshot, WorldBuilder};

/// Lifecycle of one store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Uninitialized,
    Syncing,
    Synced,
    /// Last sync failure; the previous contents stay readable while retrying.
    Error(TransportError),
    Closed,
}

impl SyncState {
    pub fn is_synced(&self) -> bool { matches!(self, SyncState::Synced) }
    pub fn is_error(&self) -> bool { matches!(self, SyncState::Error(_)) }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Uninitialized => f.write_str("uninitialized"),
            SyncState::Syncing => f.write_str("syncing"),
            SyncState::Synced => f.write_str("synced"),
            SyncState::Error(e) => write!(f, "error: {}", e),
            SyncState::Closed => f.write_str("closed"),
        }
    }
}

/// Change notification: `epoch` moves on every published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreSignal {
    pub epoch: u64,
    pub state: SyncState,
}
