use std::time::Duration;

use crate::Namespaces;

const DEFAULT_QUEUE_CAP: usize = 2048;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 30;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Per-store tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the channel between sync tasks and the applier.
    pub queue_cap: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Initial sync scope; ignored for cluster-scoped kinds.
    pub namespaces: Namespaces,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            queue_cap: DEFAULT_QUEUE_CAP,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            namespaces: Namespaces::All,
        }
    }
}

impl StoreConfig {
    /// Read `VELA_QUEUE_CAP`, `VELA_WATCH_BACKOFF_BASE_MS` and `VELA_WATCH_BACKOFF_MAX_SECS`.
    pub fn from_env() -> Self {
        let queue_cap = env_parse::<usize>("VELA_QUEUE_CAP").filter(|c| *c > 0).unwrap_or(DEFAULT_QUEUE_CAP);
        let base_ms = env_parse::<u64>("VELA_WATCH_BACKOFF_BASE_MS").unwrap_or(DEFAULT_BACKOFF_BASE_MS).max(1);
        let max_secs = env_parse::<u64>("VELA_WATCH_BACKOFF_MAX_SECS").unwrap_or(DEFAULT_BACKOFF_MAX_SECS);
        Self {
            queue_cap,
            backoff_base: Duration::from_millis(base_ms),
            backoff_max: Duration::from_secs(max_secs),
            namespaces: Namespaces::All,
        }
    }

    pub fn with_namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }
}
