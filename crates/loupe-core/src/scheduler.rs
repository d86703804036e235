use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, trace};

use loupe_model::{PoolConfig, Sequence};

use crate::capability::LoadKey;
use crate::error::LoadError;
use crate::queue::LifoQueue;
use crate::task::LoadTask;

/// Fixed-size worker pool pulling from a shared [`LifoQueue`].
///
/// Workers run tasks to completion synchronously; there is no intra-task
/// suspension, because compute steps are blocking I/O or CPU work. Task
/// failures are contained inside [`LoadTask::run`] and never take a
/// worker thread down.
pub struct Scheduler<K, A> {
    queue: Arc<LifoQueue<Arc<LoadTask<K, A>>>>,
    next_seq: AtomicU64,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl<K, A> Scheduler<K, A>
where
    K: LoadKey,
    A: Send + Sync + 'static,
{
    /// Spawn the worker pool. Pool size comes from configuration and is
    /// fixed for the scheduler's lifetime.
    pub fn new(config: &PoolConfig) -> Self {
        let queue: Arc<LifoQueue<Arc<LoadTask<K, A>>>> = Arc::new(LifoQueue::new());
        let count = config.effective_workers();

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.worker_name))
                .spawn(move || {
                    debug!(worker = index, "worker started");
                    while let Some(task) = queue.pop() {
                        trace!(worker = index, seq = task.sequence(), "task dequeued");
                        task.run();
                    }
                    debug!(worker = index, "worker stopped");
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        debug!(workers = count, "scheduler started");
        Self {
            queue,
            next_seq: AtomicU64::new(0),
            workers: Mutex::new(workers),
        }
    }

    /// Next submission sequence. Monotonic, never reused.
    pub fn next_sequence(&self) -> Sequence {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue a task. Never blocks the caller.
    pub fn submit(&self, task: Arc<LoadTask<K, A>>) -> Result<(), LoadError> {
        let seq = task.sequence();
        if self.queue.push(seq, task) {
            trace!(seq, "task submitted");
            Ok(())
        } else {
            Err(LoadError::ShuttingDown)
        }
    }

    /// Number of tasks still queued (not yet claimed by a worker).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stop accepting work and join the workers.
    ///
    /// With `drain` set, queued tasks are still executed before the
    /// workers exit; otherwise they are discarded and marked cancelled.
    /// Running tasks always finish — cancellation here is advisory like
    /// everywhere else. Idempotent.
    pub fn shutdown(&self, drain: bool) {
        let discarded = self.queue.close(!drain);
        for task in &discarded {
            task.cancel(false);
        }
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "pending tasks discarded");
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            // A worker that panicked already lost its task state; there
            // is nothing useful to propagate.
            let _ = handle.join();
        }
        debug!("scheduler stopped");
    }
}

impl<K, A> Drop for Scheduler<K, A> {
    fn drop(&mut self) {
        self.queue.close(true);
    }
}
