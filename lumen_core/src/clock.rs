//! Monotonic clock with pause/resume, grounded in the same "snapshot the
//! start instant, report elapsed deltas" idiom the teacher uses for frame
//! timing in `eclale_graphics::renderer::Renderer` (delta-time accumulation
//! across frames).

use std::time::{Duration, Instant};

/// A pausable monotonic clock. `elapsed()` reports wall-clock seconds since
/// construction, minus any time spent paused.
#[derive(Debug)]
pub struct Clock {
    start: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    /// Seconds elapsed since creation, excluding paused intervals.
    pub fn elapsed(&self) -> f64 {
        let now = self.paused_at.unwrap_or_else(Instant::now);
        (now - self.start - self.paused_total).as_secs_f64()
    }

    pub fn elapsed_duration(&self) -> Duration {
        let now = self.paused_at.unwrap_or_else(Instant::now);
        now - self.start - self.paused_total
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += Instant::now() - paused_at;
        }
    }

    /// Resets the clock to zero, discarding any accumulated pause time.
    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn elapsed_is_monotonic_non_negative() {
        let clock = Clock::new();
        let a = clock.elapsed();
        sleep(Duration::from_millis(5));
        let b = clock.elapsed();
        assert!(b >= a);
        assert!(a >= 0.0);
    }

    #[test]
    fn pause_freezes_elapsed() {
        let mut clock = Clock::new();
        clock.pause();
        let a = clock.elapsed();
        sleep(Duration::from_millis(10));
        let b = clock.elapsed();
        assert_eq!(a, b);
        clock.resume();
        sleep(Duration::from_millis(1));
        assert!(clock.elapsed() >= b);
    }

    #[test]
    fn reset_zeroes_elapsed() {
        let mut clock = Clock::new();
        sleep(Duration::from_millis(5));
        clock.reset();
        assert!(clock.elapsed() < 0.005);
    }
}
