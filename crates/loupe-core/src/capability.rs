//! Capabilities supplied by the application shell.
//!
//! The loader itself never fetches, decodes or stores anything; it drives
//! these three narrow interfaces.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Boxed error for pluggable capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Marker for types usable as load keys: opaque, equality-comparable
/// identifiers of a work item (typically a URL or asset id).
///
/// Blanket-implemented; never implement it by hand.
pub trait LoadKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static> LoadKey for T {}

/// Produces the artifact for a key. May block (network fetch, decode);
/// runs entirely inside a worker thread.
///
/// A failure means "no artifact produced". The loader does not retry;
/// retry policy, if any, belongs to the implementation.
pub trait Compute<K, A>: Send + Sync {
    fn compute(&self, key: &K) -> Result<A, BoxError>;
}

impl<K, A, F> Compute<K, A> for F
where
    F: Fn(&K) -> Result<A, BoxError> + Send + Sync,
{
    fn compute(&self, key: &K) -> Result<A, BoxError> {
        self(key)
    }
}

/// Two-tier artifact cache. Must be internally thread-safe; the loader
/// never assumes exclusive access. A failing cache operation is reported
/// as a miss — cache trouble never aborts a load.
pub trait CacheTier<K, A>: Send + Sync {
    /// Memory-tier lookup. Called from the consumer thread on the load
    /// fast path; must not block materially.
    fn get_fast(&self, key: &K) -> Option<Arc<A>>;

    /// Slow-tier lookup (e.g. disk). May block; called only from worker
    /// threads.
    fn get_slow(&self, key: &K) -> Option<Arc<A>>;

    /// Store a produced artifact. Called from worker threads, including
    /// for artifacts whose task was cancelled after production.
    fn put(&self, key: &K, artifact: Arc<A>);
}

/// Backing data for indexed loads: maps a position to a key.
pub trait DataSource<K>: Send + Sync {
    fn item(&self, index: usize) -> Option<K>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Clone + Send + Sync> DataSource<K> for Vec<K> {
    fn item(&self, index: usize) -> Option<K> {
        self.get(index).cloned()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}
