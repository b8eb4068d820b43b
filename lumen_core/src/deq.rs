//! Multi-queue dispatch primitive layered on top of [`crate::Fifo`].
//!
//! Grounded in `original_source/src/input.c`: `_deq_from_input_type` routes
//! mouse and keyboard events into distinct queue indices of one `DvzDeq`,
//! and `_input_thread` repeatedly calls `dvz_deq_dequeue_loop`, which scans
//! every registered "proc" (a group of queues sharing a pre/post callback
//! pair) and dispatches whatever it finds. The pre-callback lets a proc
//! update shared state (e.g. the mouse state machine) before the item is
//! handed to user callbacks; the post-callback resets transient state
//! afterwards (e.g. clearing wheel deltas).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::fifo::Fifo;

type PreCallback = Box<dyn Fn() + Send + Sync>;
type PostCallback = Box<dyn Fn() + Send + Sync>;

struct Proc<T> {
    queues: Vec<usize>,
    pre: Option<PreCallback>,
    post: Option<PostCallback>,
    callback: Box<dyn Fn(usize, T) + Send + Sync>,
}

/// A set of named FIFOs plus a registry of dispatch procs.
pub struct Deq<T> {
    queues: Vec<Fifo<T>>,
    procs: Mutex<Vec<Proc<T>>>,
}

impl<T: Send + 'static> Deq<T> {
    pub fn new(queue_count: usize) -> Self {
        Self {
            queues: (0..queue_count).map(|_| Fifo::new(64)).collect(),
            procs: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn enqueue(&self, queue: usize, item: T) {
        self.queues[queue].enqueue(item);
    }

    /// Non-blocking direct dequeue from a single queue, bypassing procs.
    pub fn dequeue(&self, queue: usize) -> Option<T> {
        let item = self.queues[queue].dequeue(false);
        if item.is_some() {
            self.queues[queue].processed();
        }
        item
    }

    /// Registers a proc: a set of queues served (in listed order) by one
    /// callback, wrapped by an optional pre/post hook. Returns the proc
    /// index, stable for the lifetime of this `Deq`.
    pub fn register_proc(
        &self,
        queues: Vec<usize>,
        callback: impl Fn(usize, T) + Send + Sync + 'static,
        pre: Option<PreCallback>,
        post: Option<PostCallback>,
    ) -> usize {
        let mut procs = self.procs.lock();
        procs.push(Proc {
            queues,
            pre,
            post,
            callback: Box::new(callback),
        });
        procs.len() - 1
    }

    /// Scans every registered proc once, in registration order, and for the
    /// first proc with a ready queue, dequeues and dispatches a single item.
    /// Returns `true` if any item was dispatched, letting a caller decide
    /// whether to keep spinning or back off.
    pub fn poll_once(&self) -> bool {
        let procs = self.procs.lock();
        for proc in procs.iter() {
            for &queue_idx in &proc.queues {
                if let Some(item) = self.queues[queue_idx].dequeue(false) {
                    if let Some(pre) = &proc.pre {
                        pre();
                    }
                    (proc.callback)(queue_idx, item);
                    if let Some(post) = &proc.post {
                        post();
                    }
                    self.queues[queue_idx].processed();
                    return true;
                }
            }
        }
        false
    }

    /// Runs [`Deq::poll_once`] in a loop until `running` is cleared,
    /// sleeping briefly between empty polls. This is the body of the
    /// background thread a consumer spawns for asynchronous dispatch
    /// (mirrors `dvz_deq_dequeue_loop` run from `_input_thread`).
    pub fn dequeue_loop(&self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            if !self.poll_once() {
                std::thread::sleep(Duration::from_micros(500));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn dispatch_invokes_callback_in_queue_priority_order() {
        let deq: Deq<i32> = Deq::new(2);
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        deq.register_proc(
            vec![0, 1],
            move |queue, item| r.lock().push((queue, item)),
            None,
            None,
        );
        deq.enqueue(1, 10);
        deq.enqueue(0, 20);
        assert!(deq.poll_once());
        assert!(deq.poll_once());
        assert_eq!(*received.lock(), vec![(0, 20), (1, 10)]);
    }

    #[test]
    fn pre_and_post_hooks_run_around_dispatch() {
        let deq: Deq<i32> = Deq::new(1);
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pre_trace = trace.clone();
        let post_trace = trace.clone();
        let cb_trace = trace.clone();
        deq.register_proc(
            vec![0],
            move |_, _| cb_trace.lock().push("cb"),
            Some(Box::new(move || pre_trace.lock().push("pre"))),
            Some(Box::new(move || post_trace.lock().push("post"))),
        );
        deq.enqueue(0, 1);
        deq.poll_once();
        assert_eq!(*trace.lock(), vec!["pre", "cb", "post"]);
    }

    #[test]
    fn poll_once_returns_false_when_nothing_queued() {
        let deq: Deq<i32> = Deq::new(1);
        deq.register_proc(vec![0], |_, _| {}, None, None);
        assert!(!deq.poll_once());
    }
}
