//! Bounded FIFO queue with blocking dequeue, discard and reset semantics.
//!
//! Grounded in `original_source/include/visky/fifo.h`'s `VklFifo`: a
//! capacity-bounded ring buffer guarded by a mutex/condvar pair, with an
//! `is_processing` flag so a discard pass does not race a consumer that
//! already popped an item but has not finished acting on it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Matches `VKL_MAX_FIFO_CAPACITY` from the original C runtime: queues
/// beyond this depth indicate a producer that is not being serviced, and
/// should be discarding rather than growing unbounded.
pub const MAX_FIFO_CAPACITY: usize = 64;

struct Inner<T> {
    items: VecDeque<T>,
}

/// A bounded multi-producer multi-consumer queue with blocking dequeue.
pub struct Fifo<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    capacity: usize,
    is_processing: AtomicBool,
}

impl<T> Fifo<T> {
    /// Creates a FIFO with the given capacity, clamped to
    /// [`MAX_FIFO_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(MAX_FIFO_CAPACITY)),
            }),
            not_empty: Condvar::new(),
            capacity: capacity.min(MAX_FIFO_CAPACITY),
            is_processing: AtomicBool::new(false),
        }
    }

    /// Appends an item, waking one waiting consumer. Enqueue never blocks:
    /// a queue that grows past `capacity` is a backpressure signal for the
    /// caller to discard, not something this type enforces itself (matching
    /// `vkl_fifo_enqueue`, which always succeeds and leaves discarding to an
    /// explicit `vkl_fifo_discard` call).
    pub fn enqueue(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Removes and returns the oldest item. If `wait` is true and the queue
    /// is empty, blocks until an item is enqueued.
    pub fn dequeue(&self, wait: bool) -> Option<T> {
        let mut inner = self.inner.lock();
        if wait {
            while inner.items.is_empty() {
                self.not_empty.wait(&mut inner);
            }
        }
        let item = inner.items.pop_front();
        if item.is_some() {
            self.is_processing.store(true, Ordering::SeqCst);
        }
        item
    }

    /// Like [`Fifo::dequeue`] but gives up after `timeout` if the queue
    /// stays empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            let result = self.not_empty.wait_for(&mut inner, timeout);
            if result.timed_out() && inner.items.is_empty() {
                return None;
            }
        }
        let item = inner.items.pop_front();
        if item.is_some() {
            self.is_processing.store(true, Ordering::SeqCst);
        }
        item
    }

    /// Marks the most recently dequeued item as fully handled. Callers that
    /// dequeue and then perform further work should call this once done;
    /// it lets [`Fifo::is_idle`] report accurately.
    pub fn processed(&self) {
        self.is_processing.store(false, Ordering::SeqCst);
    }

    /// True only when the queue is empty *and* no dequeued item is still
    /// being processed.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().items.is_empty() && !self.is_processing.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops the oldest items until at most `max_size` remain. Mirrors
    /// `vkl_fifo_discard`, used when a producer races ahead of a consumer
    /// that can only keep up with the newest state (e.g. resize events).
    pub fn discard(&self, max_size: usize) {
        let mut inner = self.inner.lock();
        while inner.items.len() > max_size {
            inner.items.pop_front();
        }
    }

    /// Drops every queued item without waking consumers.
    pub fn reset(&self) {
        self.inner.lock().items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn enqueue_dequeue_fifo_order() {
        let fifo: Fifo<i32> = Fifo::new(8);
        fifo.enqueue(1);
        fifo.enqueue(2);
        fifo.enqueue(3);
        assert_eq!(fifo.dequeue(false), Some(1));
        assert_eq!(fifo.dequeue(false), Some(2));
        assert_eq!(fifo.size(), 1);
    }

    #[test]
    fn dequeue_non_blocking_empty_returns_none() {
        let fifo: Fifo<i32> = Fifo::new(8);
        assert_eq!(fifo.dequeue(false), None);
    }

    #[test]
    fn discard_keeps_only_newest() {
        let fifo: Fifo<i32> = Fifo::new(8);
        for i in 0..5 {
            fifo.enqueue(i);
        }
        fifo.discard(2);
        assert_eq!(fifo.size(), 2);
        assert_eq!(fifo.dequeue(false), Some(3));
        assert_eq!(fifo.dequeue(false), Some(4));
    }

    #[test]
    fn reset_clears_all() {
        let fifo: Fifo<i32> = Fifo::new(8);
        fifo.enqueue(1);
        fifo.enqueue(2);
        fifo.reset();
        assert!(fifo.is_empty());
    }

    #[test]
    fn blocking_dequeue_wakes_on_enqueue() {
        let fifo = Arc::new(Fifo::<i32>::new(8));
        let fifo2 = fifo.clone();
        let handle = thread::spawn(move || fifo2.dequeue(true));
        thread::sleep(Duration::from_millis(20));
        fifo.enqueue(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn is_idle_reflects_processing_flag() {
        let fifo: Fifo<i32> = Fifo::new(8);
        fifo.enqueue(1);
        assert!(!fifo.is_idle());
        let item = fifo.dequeue(false);
        assert_eq!(item, Some(1));
        assert!(!fifo.is_idle());
        fifo.processed();
        assert!(fifo.is_idle());
    }
}
