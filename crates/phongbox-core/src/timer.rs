// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Wall-clock frame timer.
///
/// `tick` advances one frame and computes the delta since the previous tick.
/// Time spent between `stop` and `start` is excluded from `total_time`.
/// All public readings are seconds.
#[derive(Debug, Clone)]
pub struct Timer {
    base: Instant,
    prev: Instant,
    curr: Instant,
    stopped_at: Option<Instant>,
    paused: Duration,
    delta: f64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    pub fn new_at(now: Instant) -> Self {
        Self {
            base: now,
            prev: now,
            curr: now,
            stopped_at: None,
            paused: Duration::ZERO,
            delta: 0.0,
        }
    }

    /// Call once before entering the event loop.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        *self = Self::new_at(now);
    }

    /// Resume after `stop`. No-op when running.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        if let Some(stop) = self.stopped_at.take() {
            self.paused += now.saturating_duration_since(stop);
            self.prev = now;
            self.curr = now;
        }
    }

    /// Freeze total time. No-op when already stopped.
    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    pub fn stop_at(&mut self, now: Instant) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(now);
        }
    }

    /// Advance one frame.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        if self.stopped_at.is_some() {
            self.delta = 0.0;
            return;
        }
        self.curr = now;
        // A reading older than the previous tick clamps to zero.
        self.delta = now.saturating_duration_since(self.prev).as_secs_f64();
        self.prev = now;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    pub fn delta_time(&self) -> f32 {
        self.delta as f32
    }

    pub fn total_time(&self) -> f32 {
        let end = self.stopped_at.unwrap_or(self.curr);
        end.saturating_duration_since(self.base)
            .saturating_sub(self.paused)
            .as_secs_f32()
    }
}
