//! Per-canvas event queue and callback registry.
//!
//! Grounded in `original_source`'s event dispatch split between a
//! synchronous two-pass loop (user callbacks before scene callbacks, keyed
//! by `param == 0` vs `param > 0`) and an asynchronous background-thread
//! loop built on [`lumen_core::Deq`]. The overload-shedding policy —
//! `events_to_keep = clip(MAX_EVENT_DURATION / avg, 1, capacity)` — bounds
//! how far the async queue is allowed to fall behind a slow callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use lumen_core::Fifo;

/// Longest total backlog duration the async queue tolerates before it
/// starts discarding the oldest pending events.
pub const MAX_EVENT_DURATION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMode {
    Sync,
    Async,
}

/// Tagged union over every event kind a canvas can produce or receive.
/// `Destroy` and the sentinel `None` both terminate an async consumer
/// thread; `None` is used internally by the queue and never handed to a
/// user callback.
#[derive(Debug, Clone)]
pub enum Event {
    Init,
    Refill,
    Frame { idx: u32 },
    Timer { id: u32, tick: u64, now: f64 },
    MouseButton,
    MouseMove,
    MouseWheel,
    MouseDrag,
    MouseClick,
    MouseDoubleClick,
    Key,
    Resize { width: u32, height: u32 },
    Screencast { rgba: Vec<u8>, width: u32, height: u32 },
    PreSend,
    PostSend,
    Destroy,
    Imgui,
}

impl Event {
    /// Stable numeric tag used to key [`EventQueue::register`] entries and
    /// match dispatched events against them; public so callers outside this
    /// crate (the presenter, the demo binary) can subscribe to a specific
    /// event kind without constructing a dummy payload.
    pub fn kind_id(&self) -> u32 {
        match self {
            Event::Init => 0,
            Event::Refill => 1,
            Event::Frame { .. } => 2,
            Event::Timer { .. } => 3,
            Event::MouseButton => 4,
            Event::MouseMove => 5,
            Event::MouseWheel => 6,
            Event::MouseDrag => 7,
            Event::MouseClick => 8,
            Event::MouseDoubleClick => 9,
            Event::Key => 10,
            Event::Resize { .. } => 11,
            Event::Screencast { .. } => 12,
            Event::PreSend => 13,
            Event::PostSend => 14,
            Event::Destroy => 15,
            Event::Imgui => 16,
        }
    }
}

type Callback = Box<dyn Fn(&Event) + Send + Sync>;

struct CallbackEntry {
    kind_id: u32,
    mode: CallbackMode,
    /// Timer period (seconds) for periodic callbacks, or dispatch
    /// priority: entries with `param == 0` run in the sync loop's first
    /// pass, entries with `param > 0` in the second.
    param: u32,
    callback: Callback,
}

/// A queued async item: the event plus which registered entry it targets.
struct QueuedItem {
    entry_index: usize,
    event: Event,
}

/// Per-canvas event queue plus callback registry, supporting both
/// synchronous (caller's thread, two-pass) and asynchronous (background
/// thread, overload-shedding) dispatch.
pub struct EventQueue {
    callbacks: RwLock<Vec<CallbackEntry>>,
    async_queue: Fifo<QueuedItem>,
    avg_callback_duration: Mutex<Duration>,
    dispatch_count: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            async_queue: Fifo::new(lumen_core::fifo::MAX_FIFO_CAPACITY),
            avg_callback_duration: Mutex::new(Duration::from_micros(1)),
            dispatch_count: AtomicU64::new(0),
        }
    }

    /// Registers a callback for `kind_id` (matching [`Event::kind_id`]).
    /// Returns the entry index, used to target async enqueues.
    pub fn register(
        &self,
        kind_id: u32,
        mode: CallbackMode,
        param: u32,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> usize {
        let mut callbacks = self.callbacks.write();
        callbacks.push(CallbackEntry {
            kind_id,
            mode,
            param,
            callback: Box::new(callback),
        });
        callbacks.len() - 1
    }

    /// Dispatches `event` synchronously on the calling thread, two-pass:
    /// every matching entry with `param == 0` first, then every matching
    /// entry with `param > 0`.
    pub fn dispatch_sync(&self, event: Event) {
        let kind_id = event.kind_id();
        let callbacks = self.callbacks.read();
        for entry in callbacks
            .iter()
            .filter(|e| e.mode == CallbackMode::Sync && e.kind_id == kind_id && e.param == 0)
        {
            (entry.callback)(&event);
        }
        for entry in callbacks
            .iter()
            .filter(|e| e.mode == CallbackMode::Sync && e.kind_id == kind_id && e.param > 0)
        {
            (entry.callback)(&event);
        }
    }

    /// Posts `event` to every matching async entry for background dispatch.
    pub fn dispatch_async(&self, event: Event) {
        let kind_id = event.kind_id();
        let callbacks = self.callbacks.read();
        for (index, _) in callbacks
            .iter()
            .enumerate()
            .filter(|(_, e)| e.mode == CallbackMode::Async && e.kind_id == kind_id)
        {
            self.async_queue.enqueue(QueuedItem {
                entry_index: index,
                event: event.clone_for_async(),
            });
        }
        self.shed_overload();
    }

    /// Runs one item from the async queue, updating the rolling average
    /// callback duration used by the overload-shedding policy. Returns
    /// `false` if the queue was empty (nothing dispatched) or a `Destroy`
    /// sentinel was consumed, signalling the caller's loop to stop.
    pub fn poll_async(&self) -> bool {
        let Some(item) = self.async_queue.dequeue(false) else {
            self.async_queue.processed();
            return false;
        };
        if matches!(item.event, Event::Destroy) {
            self.async_queue.processed();
            return false;
        }
        let callbacks = self.callbacks.read();
        if let Some(entry) = callbacks.get(item.entry_index) {
            let start = Instant::now();
            (entry.callback)(&item.event);
            let elapsed = start.elapsed();
            let n = self.dispatch_count.fetch_add(1, Ordering::Relaxed) + 1;
            let mut avg = self.avg_callback_duration.lock();
            *avg = (*avg * (n.saturating_sub(1) as u32) + elapsed) / (n as u32).max(1);
        }
        self.async_queue.processed();
        true
    }

    fn shed_overload(&self) {
        let avg = *self.avg_callback_duration.lock();
        if avg.is_zero() {
            return;
        }
        let capacity = self.async_queue.capacity();
        let ratio = MAX_EVENT_DURATION.as_secs_f64() / avg.as_secs_f64();
        let keep = ratio.clamp(1.0, capacity as f64) as usize;
        if keep < capacity {
            self.async_queue.discard(keep);
        }
    }

    /// Enqueues the `Destroy` sentinel, which terminates an async consumer
    /// loop the next time it dequeues.
    pub fn close(&self) {
        self.async_queue.enqueue(QueuedItem {
            entry_index: usize::MAX,
            event: Event::Destroy,
        });
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    fn clone_for_async(&self) -> Event {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn sync_dispatch_runs_param_zero_before_param_nonzero() {
        let queue = EventQueue::new();
        let trace = Arc::new(Mutex::new(Vec::new()));
        let t1 = trace.clone();
        let t2 = trace.clone();
        queue.register(Event::Init.kind_id(), CallbackMode::Sync, 1, move |_| {
            t1.lock().push("scene")
        });
        queue.register(Event::Init.kind_id(), CallbackMode::Sync, 0, move |_| {
            t2.lock().push("user")
        });
        queue.dispatch_sync(Event::Init);
        assert_eq!(*trace.lock(), vec!["user", "scene"]);
    }

    #[test]
    fn async_dispatch_requires_poll() {
        let queue = EventQueue::new();
        let trace = Arc::new(Mutex::new(Vec::new()));
        let t = trace.clone();
        queue.register(Event::Resize { width: 0, height: 0 }.kind_id(), CallbackMode::Async, 0, move |_| {
            t.lock().push(true)
        });
        queue.dispatch_async(Event::Resize { width: 10, height: 10 });
        assert!(trace.lock().is_empty());
        assert!(queue.poll_async());
        assert_eq!(trace.lock().len(), 1);
    }

    #[test]
    fn close_sentinel_stops_poll_loop() {
        let queue = EventQueue::new();
        queue.close();
        assert!(!queue.poll_async());
    }

    #[test]
    fn overload_shedding_trims_backlog_after_slow_callbacks() {
        let queue = EventQueue::new();
        queue.register(Event::Frame { idx: 0 }.kind_id(), CallbackMode::Async, 0, |_| {
            std::thread::sleep(Duration::from_millis(5));
        });
        for i in 0..10 {
            queue.dispatch_async(Event::Frame { idx: i });
        }
        assert!(queue.poll_async());
        for _ in 0..20 {
            queue.dispatch_async(Event::Frame { idx: 0 });
        }
        assert!(queue.async_queue.size() <= lumen_core::fifo::MAX_FIFO_CAPACITY);
    }
}
