//! Drift-corrected periodic timers.
//!
//! Grounded in `original_source/include/visky/input.h`'s `DvzTimerItem`
//! and the wait-callback that runs every millisecond while the async input
//! queue blocks (`original_source/src/input.c`). Each tick is expected at
//! `start_time + after + tick * period`, computed from the *start*
//! snapshot rather than by accumulating deltas, so short scheduling jitter
//! on one tick cannot shift every subsequent tick.

use lumen_core::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerTick {
    pub id: u32,
    pub now: f64,
    pub tick: u64,
    pub interval_since_last_expected: f64,
}

/// A single periodic timer. `after`/`period` are seconds, matching the
/// public API's float-seconds convention even though the C source stores
/// milliseconds internally.
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: u32,
    after: f64,
    period: f64,
    max_count: u64,
    start_time: f64,
    start_tick: u64,
    /// Offset added once from `start_time`, before the `(tick - start_tick)
    /// * period` term. Equal to `after` on the initial `start()`; equal to
    /// `period` on `resume()`, so the first tick following a resume is
    /// always a full period away rather than immediate.
    effective_after: f64,
    tick: u64,
    running: bool,
    created: bool,
}

impl Timer {
    pub fn new(id: u32, after: f64, period: f64, max_count: u64) -> Self {
        Self {
            id,
            after,
            period,
            max_count,
            start_time: 0.0,
            start_tick: 0,
            effective_after: after,
            tick: 0,
            running: false,
            created: true,
        }
    }

    pub fn start(&mut self, now: f64) {
        self.start_time = now;
        self.start_tick = 0;
        self.effective_after = self.after;
        self.tick = 0;
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resumes the timer, snapshotting `start_tick`/`start_time` at the
    /// current tick count so resuming never produces a burst of
    /// catch-up ticks for the time spent paused.
    pub fn resume(&mut self, now: f64) {
        self.start_time = now;
        self.start_tick = self.tick;
        self.effective_after = self.period;
        self.running = true;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    fn expected_time(&self, tick: u64) -> f64 {
        self.start_time
            + self.effective_after
            + (tick.saturating_sub(self.start_tick)) as f64 * self.period
    }

    /// Advances the timer against wall-clock `now`, returning every tick
    /// that has become due since the last call (ordinarily zero or one,
    /// but more if the caller stalled).
    pub fn poll(&mut self, now: f64) -> Vec<TimerTick> {
        let mut out = Vec::new();
        if !self.created || !self.running {
            return out;
        }
        loop {
            if self.max_count != 0 && self.tick >= self.max_count {
                break;
            }
            let expected = self.expected_time(self.tick);
            if now >= expected {
                out.push(TimerTick {
                    id: self.id,
                    now,
                    tick: self.tick,
                    interval_since_last_expected: self.period,
                });
                self.tick += 1;
            } else {
                break;
            }
        }
        out
    }
}

/// Owns a set of timers plus the clock they're polled against; this is
/// what a canvas's input queue wait callback drives every millisecond.
pub struct TimerSet {
    clock: Clock,
    timers: Vec<Timer>,
    next_id: u32,
}

impl TimerSet {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            timers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn create(&mut self, after: f64, period: f64, max_count: u64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let mut timer = Timer::new(id, after, period, max_count);
        timer.start(self.clock.elapsed());
        self.timers.push(timer);
        id
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Timer> {
        self.timers.iter_mut().find(|t| t.id == id)
    }

    pub fn remove(&mut self, id: u32) {
        self.timers.retain(|t| t.id != id);
    }

    /// Polls every timer against the current clock reading, returning all
    /// due ticks across all timers. Called from the 1 ms wait callback.
    pub fn poll(&mut self) -> Vec<TimerTick> {
        let now = self.clock.elapsed();
        self.timers.iter_mut().flat_map(|t| t.poll(now)).collect()
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tick_before_first_deadline() {
        let mut timer = Timer::new(0, 0.1, 0.1, 0);
        timer.start(0.0);
        assert!(timer.poll(0.05).is_empty());
    }

    #[test]
    fn single_tick_at_deadline() {
        let mut timer = Timer::new(0, 0.1, 0.1, 0);
        timer.start(0.0);
        let ticks = timer.poll(0.1);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].tick, 0);
    }

    #[test]
    fn catches_up_multiple_missed_ticks() {
        let mut timer = Timer::new(0, 0.0, 0.1, 0);
        timer.start(0.0);
        let ticks = timer.poll(0.35);
        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks[3].tick, 3);
    }

    #[test]
    fn max_count_stops_ticking() {
        let mut timer = Timer::new(0, 0.0, 0.1, 2);
        timer.start(0.0);
        let ticks = timer.poll(1.0);
        assert_eq!(ticks.len(), 2);
        assert!(timer.poll(2.0).is_empty());
    }

    #[test]
    fn resume_does_not_burst_catch_up_ticks() {
        let mut timer = Timer::new(0, 0.0, 0.1, 0);
        timer.start(0.0);
        timer.poll(0.25);
        assert_eq!(timer.tick_count(), 3);
        timer.pause();
        timer.resume(10.0);
        let ticks = timer.poll(10.05);
        assert!(ticks.is_empty());
        let ticks = timer.poll(10.1);
        assert_eq!(ticks.len(), 1);
    }
}
