use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, trace};

use loupe_model::TargetId;

use crate::binding::BindingTracker;
use crate::capability::LoadKey;
use crate::task::LoadTask;

/// A completed result travelling from a worker thread to the consumer.
pub(crate) struct Envelope<K, A> {
    pub task: Arc<LoadTask<K, A>>,
    pub artifact: Arc<A>,
}

pub(crate) fn channel<K, A>(
    bindings: BindingTracker<K, A>,
    exit_early: Arc<AtomicBool>,
) -> (Sender<Envelope<K, A>>, Deliveries<K, A>) {
    let (tx, rx) = unbounded();
    (
        tx,
        Deliveries {
            rx,
            bindings,
            exit_early,
        },
    )
}

/// Consumer-side end of the result hand-off.
///
/// Results are queued in completion order (FIFO among results that reach
/// this stage) and must be drained on the single thread that owns the
/// targets — the same thread that calls `Loader::load`. Each envelope is
/// staleness-checked one last time before the render callback runs: the
/// window between worker completion and consumer-thread execution is
/// exactly where a newer request can still supersede the binding.
///
/// Not `Clone`: there is one consumer.
pub struct Deliveries<K, A> {
    rx: Receiver<Envelope<K, A>>,
    bindings: BindingTracker<K, A>,
    exit_early: Arc<AtomicBool>,
}

impl<K, A> Deliveries<K, A>
where
    K: LoadKey,
    A: Send + Sync + 'static,
{
    /// Process every result currently queued without blocking.
    /// Returns the number of artifacts actually rendered.
    pub fn drain<F>(&self, mut render: F) -> usize
    where
        F: FnMut(&K, TargetId, Arc<A>),
    {
        let mut delivered = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            if self.handle(envelope, &mut render) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait up to `timeout` for one result and process it.
    /// Returns `true` if an envelope arrived (delivered or discarded).
    pub fn next_timeout<F>(&self, timeout: Duration, mut render: F) -> bool
    where
        F: FnMut(&K, TargetId, Arc<A>),
    {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.handle(envelope, &mut render);
                true
            }
            Err(_) => false,
        }
    }

    /// Process results until every producer handle is gone (i.e. the
    /// loader and all of its tasks have been dropped).
    pub fn run<F>(&self, mut render: F)
    where
        F: FnMut(&K, TargetId, Arc<A>),
    {
        while let Ok(envelope) = self.rx.recv() {
            self.handle(envelope, &mut render);
        }
    }

    /// Final staleness check, then render. A delivered result dissolves
    /// the binding: the target is no longer waiting on anything.
    fn handle<F>(&self, envelope: Envelope<K, A>, render: &mut F) -> bool
    where
        F: FnMut(&K, TargetId, Arc<A>),
    {
        let target = envelope.task.target();

        if self.exit_early.load(Ordering::Acquire) {
            trace!(%target, "delivery dropped, exit-early set");
            return false;
        }
        if !self.bindings.is_current(target, &envelope.task) {
            debug!(%target, "stale result dropped");
            return false;
        }

        self.bindings.detach(target);
        render(envelope.task.key(), target, envelope.artifact);
        true
    }
}
