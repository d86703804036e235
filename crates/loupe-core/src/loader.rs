use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::{debug, trace};

use loupe_model::{PoolConfig, TargetId, TaskStatus};

use crate::binding::BindingTracker;
use crate::capability::{CacheTier, Compute, DataSource, LoadKey};
use crate::dispatch::{self, Deliveries, Envelope};
use crate::error::LoadError;
use crate::scheduler::Scheduler;
use crate::task::LoadTask;

/// What a `load` call did.
pub enum LoadOutcome<K, A> {
    /// Memory-tier cache hit; the artifact is returned synchronously and
    /// the caller renders it immediately.
    Hit(Arc<A>),
    /// A task for the same key is already bound to this target; nothing
    /// was cancelled or resubmitted.
    InFlight(LoadHandle<K, A>),
    /// A new task was bound to the target and queued.
    Queued(LoadHandle<K, A>),
}

impl<K, A> LoadOutcome<K, A> {
    pub fn is_hit(&self) -> bool {
        matches!(self, LoadOutcome::Hit(_))
    }
}

// Keys and artifacts carry no Debug bound, so spell the variants out.
impl<K, A> fmt::Debug for LoadOutcome<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOutcome::Hit(_) => f.write_str("Hit"),
            LoadOutcome::InFlight(_) => f.write_str("InFlight"),
            LoadOutcome::Queued(_) => f.write_str("Queued"),
        }
    }
}

/// Cancellable reference to a submitted task.
pub struct LoadHandle<K, A> {
    task: Arc<LoadTask<K, A>>,
}

impl<K, A> LoadHandle<K, A>
where
    K: LoadKey,
    A: Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        self.task.key()
    }

    pub fn target(&self) -> TargetId {
        self.task.target()
    }

    pub fn sequence(&self) -> loupe_model::Sequence {
        self.task.sequence()
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Whether cancellation has been requested for the task.
    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Advisory cancellation; see [`LoadTask::cancel`].
    pub fn cancel(&self, allow_interrupt: bool) -> bool {
        self.task.cancel(allow_interrupt)
    }
}

/// Primary entry point: asynchronous artifact loading on behalf of
/// UI-bound targets, with per-target supersede/cancel semantics.
///
/// Construct via [`Loader::builder`]; the build returns the loader
/// together with its [`Deliveries`] end, which the consumer thread owns.
pub struct Loader<K, A> {
    scheduler: Scheduler<K, A>,
    bindings: BindingTracker<K, A>,
    deliveries_tx: Sender<Envelope<K, A>>,
    compute: Arc<dyn Compute<K, A>>,
    cache: Option<Arc<dyn CacheTier<K, A>>>,
    source: Option<Arc<dyn DataSource<K>>>,
    exit_early: Arc<AtomicBool>,
}

impl<K, A> Loader<K, A>
where
    K: LoadKey,
    A: Send + Sync + 'static,
{
    pub fn builder(compute: impl Compute<K, A> + 'static) -> LoaderBuilder<K, A> {
        LoaderBuilder {
            config: PoolConfig::default(),
            compute: Arc::new(compute),
            cache: None,
            source: None,
        }
    }

    /// Load the artifact for `key` on behalf of `target`.
    ///
    /// Non-blocking apart from the memory-tier fast path. A previous task
    /// bound to the same target is superseded (advisorily cancelled)
    /// unless it is already loading the same key, in which case it stays
    /// authoritative and nothing is resubmitted.
    pub fn load(&self, key: K, target: TargetId) -> Result<LoadOutcome<K, A>, LoadError> {
        if let Some(cache) = &self.cache
            && let Some(artifact) = cache.get_fast(&key)
        {
            // The hit replaces whatever was pending for this target.
            if let Some(previous) = self.bindings.detach(target) {
                previous.cancel(false);
            }
            trace!(key = ?key, %target, "memory-tier hit");
            return Ok(LoadOutcome::Hit(artifact));
        }

        if let Some(previous) = self.bindings.get(target)
            && previous.key() == &key
            && !previous.is_cancelled()
            && previous.status().is_active()
        {
            trace!(key = ?key, %target, "same key already in flight");
            return Ok(LoadOutcome::InFlight(LoadHandle { task: previous }));
        }

        let task = Arc::new(LoadTask::new(
            key,
            target,
            self.scheduler.next_sequence(),
            Arc::clone(&self.compute),
            self.cache.clone(),
            self.bindings.clone(),
            self.deliveries_tx.clone(),
            Arc::clone(&self.exit_early),
        ));

        if let Some(superseded) = self.bindings.attach(target, Arc::clone(&task)) {
            debug!(key = ?superseded.key(), %target, "superseding previous task");
            superseded.cancel(false);
        }

        if let Err(err) = self.scheduler.submit(Arc::clone(&task)) {
            self.bindings.detach(target);
            return Err(err);
        }
        Ok(LoadOutcome::Queued(LoadHandle { task }))
    }

    /// Indexed variant of [`load`](Self::load), resolving the key through
    /// the configured [`DataSource`]. Calling this without a data source
    /// is a programming error and fails fast.
    pub fn load_index(
        &self,
        index: usize,
        target: TargetId,
    ) -> Result<LoadOutcome<K, A>, LoadError> {
        let source = self.source.as_ref().ok_or(LoadError::NoDataSource)?;
        let key = source.item(index).ok_or(LoadError::IndexOutOfBounds {
            index,
            len: source.len(),
        })?;
        self.load(key, target)
    }

    /// Detach and cancel whatever task currently owns `target`.
    /// Returns `true` if a task was bound.
    pub fn cancel(&self, target: TargetId) -> bool {
        match self.bindings.detach(target) {
            Some(task) => {
                task.cancel(true);
                debug!(key = ?task.key(), %target, "load cancelled");
                true
            }
            None => false,
        }
    }

    /// Handle to the task currently bound to `target`, if any.
    pub fn active(&self, target: TargetId) -> Option<LoadHandle<K, A>> {
        self.bindings.get(target).map(|task| LoadHandle { task })
    }

    /// Tell in-flight tasks to bail out at their next checkpoint and
    /// suppress all deliveries. Used while the surrounding UI is tearing
    /// down or paused; produced artifacts are still cached.
    pub fn set_exit_early(&self, exit: bool) {
        self.exit_early.store(exit, Ordering::Release);
    }

    pub fn exit_early(&self) -> bool {
        self.exit_early.load(Ordering::Acquire)
    }

    /// Stop accepting new work and join the worker pool. With `drain`
    /// set, queued tasks still execute first; otherwise they are
    /// discarded. In-flight deliveries remain readable on the
    /// [`Deliveries`] end afterwards.
    pub fn shutdown(&self, drain: bool) {
        self.scheduler.shutdown(drain);
    }
}

/// Builder for [`Loader`].
pub struct LoaderBuilder<K, A> {
    config: PoolConfig,
    compute: Arc<dyn Compute<K, A>>,
    cache: Option<Arc<dyn CacheTier<K, A>>>,
    source: Option<Arc<dyn DataSource<K>>>,
}

impl<K, A> LoaderBuilder<K, A>
where
    K: LoadKey,
    A: Send + Sync + 'static,
{
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache(mut self, cache: impl CacheTier<K, A> + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn data_source(mut self, source: impl DataSource<K> + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Spawn the worker pool and hand back the loader plus the consumer
    /// end of the delivery channel.
    pub fn build(self) -> (Loader<K, A>, Deliveries<K, A>) {
        let bindings = BindingTracker::new();
        let exit_early = Arc::new(AtomicBool::new(false));
        let (deliveries_tx, deliveries) =
            dispatch::channel(bindings.clone(), Arc::clone(&exit_early));
        let scheduler = Scheduler::new(&self.config);

        let loader = Loader {
            scheduler,
            bindings,
            deliveries_tx,
            compute: self.compute,
            cache: self.cache,
            source: self.source,
            exit_early,
        };
        (loader, deliveries)
    }
}
