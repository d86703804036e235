use serde::{Deserialize, Serialize};

/// Default number of worker threads.
///
/// The pool is sized for I/O-bound work, not CPU parallelism; a small
/// constant is enough. Deployments can raise it through configuration.
const DEFAULT_WORKERS: usize = 2;

const DEFAULT_WORKER_NAME: &str = "loupe-worker";

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Number of worker threads to spawn.
    pub workers: usize,
    /// Prefix for worker thread names (`"<prefix>-<index>"`).
    pub worker_name: String,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Worker count actually used by the pool: zero is clamped to one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
