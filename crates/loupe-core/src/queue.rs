use std::collections::BinaryHeap;

use parking_lot::{Condvar, Mutex};
use loupe_model::Sequence;

/// Unbounded blocking queue serving the most recently pushed item first.
///
/// Entries are ordered by their submission sequence; among pending items
/// the highest sequence wins (strict LIFO). In an interactive context the
/// most recent request is the one most likely still relevant, so older
/// pending items are allowed to starve. No aging or fairness mechanism.
pub struct LifoQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

struct Inner<T> {
    heap: BinaryHeap<Entry<T>>,
    closed: bool,
}

struct Entry<T> {
    seq: Sequence,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq.cmp(&other.seq)
    }
}

impl<T> LifoQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Insert an item with its submission sequence. O(log n).
    ///
    /// Returns `false` if the queue has been closed (the item is dropped).
    pub fn push(&self, seq: Sequence, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.heap.push(Entry { seq, item });
        self.available.notify_one();
        true
    }

    /// Block until an item is available and return the one with the
    /// greatest sequence. Returns `None` once the queue is closed and
    /// drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(entry) = inner.heap.pop() {
                return Some(entry.item);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Stop accepting new items and wake all blocked consumers.
    ///
    /// When `discard_pending` is set, items still queued are removed and
    /// returned to the caller instead of being served.
    pub fn close(&self, discard_pending: bool) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let discarded = if discard_pending {
            inner.heap.drain().map(|entry| entry.item).collect()
        } else {
            Vec::new()
        };
        self.available.notify_all();
        discarded
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl<T> Default for LifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn newest_pushed_pops_first() {
        let queue = LifoQueue::new();
        queue.push(1, "a");
        queue.push(2, "b");
        queue.push(3, "c");

        assert_eq!(queue.pop(), Some("c"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("a"));
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(LifoQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(1, 42u32);

        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: Arc<LifoQueue<u32>> = Arc::new(LifoQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close(false);

        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn close_without_discard_serves_remaining() {
        let queue = LifoQueue::new();
        queue.push(1, "a");
        queue.push(2, "b");

        let discarded = queue.close(false);
        assert!(discarded.is_empty());

        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn close_with_discard_returns_pending() {
        let queue = LifoQueue::new();
        queue.push(1, "a");
        queue.push(2, "b");

        let discarded = queue.close(true);
        assert_eq!(discarded.len(), 2);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_after_close_is_rejected() {
        let queue = LifoQueue::new();
        assert!(!queue.is_closed());
        queue.close(false);
        assert!(queue.is_closed());

        assert!(!queue.push(1, "late"));
        assert_eq!(queue.pop(), None);
    }
}
