use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use loupe_model::{Sequence, TargetId, TaskStatus};

use crate::binding::BindingTracker;
use crate::capability::{CacheTier, Compute, LoadKey};
use crate::dispatch::Envelope;

/// A cancellable unit of work: cache-check, compute, cache-populate,
/// deliver — with cancellation checkpoints between the steps.
///
/// Cancellation is advisory and cooperative. A running task is never
/// interrupted; it observes the flag at its next checkpoint, and a result
/// that outlives its binding is discarded rather than delivered.
pub struct LoadTask<K, A> {
    key: K,
    target: TargetId,
    sequence: Sequence,
    status: Mutex<TaskStatus>,
    cancelled: AtomicBool,
    compute: Arc<dyn Compute<K, A>>,
    cache: Option<Arc<dyn CacheTier<K, A>>>,
    bindings: BindingTracker<K, A>,
    deliveries: Sender<Envelope<K, A>>,
    exit_early: Arc<AtomicBool>,
}

impl<K, A> LoadTask<K, A>
where
    K: LoadKey,
    A: Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: K,
        target: TargetId,
        sequence: Sequence,
        compute: Arc<dyn Compute<K, A>>,
        cache: Option<Arc<dyn CacheTier<K, A>>>,
        bindings: BindingTracker<K, A>,
        deliveries: Sender<Envelope<K, A>>,
        exit_early: Arc<AtomicBool>,
    ) -> Self {
        Self {
            key,
            target,
            sequence,
            status: Mutex::new(TaskStatus::Pending),
            cancelled: AtomicBool::new(false),
            compute,
            cache,
            bindings,
            deliveries,
            exit_early,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.lock()
    }

    /// Whether cancellation has been requested (the task may still be
    /// running toward its next checkpoint).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation. Returns `true` if the request took effect.
    ///
    /// A `Pending` task is cancelled outright and will be skipped by the
    /// worker that dequeues it. A `Running` task is only flagged when
    /// `allow_interrupt` is set; with `allow_interrupt == false` it runs
    /// to completion and staleness discards its result at delivery time.
    pub fn cancel(&self, allow_interrupt: bool) -> bool {
        let mut status = self.status.lock();
        match *status {
            TaskStatus::Pending => {
                *status = TaskStatus::Cancelled;
                self.cancelled.store(true, Ordering::Release);
                trace!(key = ?self.key, seq = self.sequence, "pending task cancelled");
                true
            }
            TaskStatus::Running if allow_interrupt => {
                self.cancelled.store(true, Ordering::Release);
                trace!(key = ?self.key, seq = self.sequence, "running task flagged for cancellation");
                true
            }
            _ => false,
        }
    }

    /// Claim the task for execution: `Pending -> Running`.
    /// Returns `false` if it was cancelled while queued.
    fn claim(&self) -> bool {
        let mut status = self.status.lock();
        if *status == TaskStatus::Pending {
            *status = TaskStatus::Running;
            true
        } else {
            false
        }
    }

    /// Settle the terminal state once execution is over.
    fn finish(&self) {
        let mut status = self.status.lock();
        *status = if self.cancelled.load(Ordering::Acquire) {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Completed
        };
    }

    /// True while this task is still allowed to proceed: not cancelled,
    /// the loader is not tearing down, and the target's binding still
    /// points here. Cancellation can arrive from another thread at any
    /// point, so every step re-checks.
    fn checkpoint(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
            && !self.exit_early.load(Ordering::Acquire)
            && self.bindings.is_current(self.target, self)
    }

    /// Execute the load sequence on the current (worker) thread.
    pub(crate) fn run(self: Arc<Self>) {
        if !self.claim() {
            trace!(key = ?self.key, seq = self.sequence, "skipping cancelled task");
            return;
        }

        let mut artifact: Option<Arc<A>> = None;

        // Slow-tier lookup first; may block, which is fine on a worker.
        if let Some(cache) = &self.cache
            && self.checkpoint()
        {
            artifact = cache.get_slow(&self.key);
            if artifact.is_some() {
                trace!(key = ?self.key, "slow-tier cache hit");
            }
        }

        if artifact.is_none() && self.checkpoint() {
            let key = &self.key;
            match catch_unwind(AssertUnwindSafe(|| self.compute.compute(key))) {
                Ok(Ok(produced)) => artifact = Some(Arc::new(produced)),
                Ok(Err(err)) => {
                    debug!(key = ?self.key, error = %err, "compute failed, no artifact produced");
                }
                Err(_) => {
                    warn!(key = ?self.key, "compute panicked, no artifact produced");
                }
            }
        }

        // A produced artifact is always worth caching, even when the task
        // was superseded meanwhile: cancellation only means "don't deliver
        // to this target".
        if let (Some(produced), Some(cache)) = (&artifact, &self.cache) {
            cache.put(&self.key, Arc::clone(produced));
        }

        if !self.checkpoint() {
            trace!(key = ?self.key, seq = self.sequence, "result discarded, task superseded or cancelled");
            self.finish();
            return;
        }

        if let Some(produced) = artifact {
            // Send failure means the consumer side is gone; nothing to do.
            let _ = self.deliveries.send(Envelope {
                task: Arc::clone(&self),
                artifact: produced,
            });
        }
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::BoxError;
    use crate::dispatch;

    type StrTask = LoadTask<String, String>;

    struct Harness {
        bindings: BindingTracker<String, String>,
        deliveries: dispatch::Deliveries<String, String>,
        tx: Sender<Envelope<String, String>>,
        exit_early: Arc<AtomicBool>,
    }

    fn harness() -> Harness {
        let bindings = BindingTracker::new();
        let exit_early = Arc::new(AtomicBool::new(false));
        let (tx, deliveries) = dispatch::channel(bindings.clone(), Arc::clone(&exit_early));
        Harness {
            bindings,
            deliveries,
            tx,
            exit_early,
        }
    }

    fn task(h: &Harness, key: &str, target: TargetId, seq: Sequence) -> Arc<StrTask> {
        let compute = |key: &String| Ok::<_, BoxError>(format!("img:{key}"));
        Arc::new(LoadTask::new(
            key.to_string(),
            target,
            seq,
            Arc::new(compute),
            None,
            h.bindings.clone(),
            h.tx.clone(),
            Arc::clone(&h.exit_early),
        ))
    }

    fn drain(h: &Harness) -> Vec<String> {
        let mut rendered = Vec::new();
        h.deliveries.drain(|_key, _target, artifact| {
            rendered.push(artifact.as_ref().clone());
        });
        rendered
    }

    #[test]
    fn bound_task_delivers() {
        let h = harness();
        let target = TargetId::new();
        let t = task(&h, "1", target, 1);
        h.bindings.attach(target, Arc::clone(&t));

        Arc::clone(&t).run();

        assert_eq!(t.status(), TaskStatus::Completed);
        assert_eq!(drain(&h), vec!["img:1".to_string()]);
    }

    #[test]
    fn unbound_task_discards_result() {
        let h = harness();
        let t = task(&h, "1", TargetId::new(), 1);
        // Never attached: the binding check fails at the first checkpoint.
        Arc::clone(&t).run();

        assert_eq!(t.status(), TaskStatus::Completed);
        assert!(drain(&h).is_empty());
    }

    #[test]
    fn cancelled_pending_task_never_runs() {
        let h = harness();
        let target = TargetId::new();
        let t = task(&h, "1", target, 1);
        h.bindings.attach(target, Arc::clone(&t));

        assert!(t.cancel(false));
        assert_eq!(t.status(), TaskStatus::Cancelled);

        Arc::clone(&t).run();
        assert!(drain(&h).is_empty());
    }

    #[test]
    fn cancel_without_interrupt_fails_on_running_task() {
        let h = harness();
        let t = task(&h, "1", TargetId::new(), 1);
        assert!(t.claim());

        assert!(!t.cancel(false));
        assert!(!t.is_cancelled());

        assert!(t.cancel(true));
        assert!(t.is_cancelled());
    }

    #[test]
    fn cancel_on_terminal_task_is_a_no_op() {
        let h = harness();
        let target = TargetId::new();
        let t = task(&h, "1", target, 1);
        h.bindings.attach(target, Arc::clone(&t));
        Arc::clone(&t).run();

        assert_eq!(t.status(), TaskStatus::Completed);
        assert!(!t.cancel(true));
        assert_eq!(t.status(), TaskStatus::Completed);
    }

    #[test]
    fn exit_early_suppresses_delivery() {
        let h = harness();
        let target = TargetId::new();
        let t = task(&h, "1", target, 1);
        h.bindings.attach(target, Arc::clone(&t));

        h.exit_early.store(true, Ordering::Release);
        Arc::clone(&t).run();

        assert!(drain(&h).is_empty());
    }

    #[test]
    fn failing_compute_completes_without_delivery() {
        let h = harness();
        let target = TargetId::new();
        let compute = |_key: &String| Err::<String, BoxError>("boom".into());
        let t = Arc::new(LoadTask::new(
            "1".to_string(),
            target,
            1,
            Arc::new(compute),
            None,
            h.bindings.clone(),
            h.tx.clone(),
            Arc::clone(&h.exit_early),
        ));
        h.bindings.attach(target, Arc::clone(&t));

        Arc::clone(&t).run();

        assert_eq!(t.status(), TaskStatus::Completed);
        assert!(drain(&h).is_empty());
    }

    #[test]
    fn panicking_compute_is_contained() {
        let h = harness();
        let target = TargetId::new();
        let compute = |_key: &String| -> Result<String, BoxError> { panic!("decode blew up") };
        let t = Arc::new(LoadTask::new(
            "1".to_string(),
            target,
            1,
            Arc::new(compute),
            None,
            h.bindings.clone(),
            h.tx.clone(),
            Arc::clone(&h.exit_early),
        ));
        h.bindings.attach(target, Arc::clone(&t));

        Arc::clone(&t).run();

        assert_eq!(t.status(), TaskStatus::Completed);
        assert!(drain(&h).is_empty());
    }
}
