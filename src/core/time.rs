//! Frame timing utilities

use std::time::{Duration, Instant};

/// Timing snapshot handed to every `update` and `draw` call of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tick {
    /// Time since the timer was created.
    pub total: Duration,
    /// Time since the previous frame.
    pub delta: Duration,
    /// Frame index, starting at 1 for the first ticked frame.
    pub frame: u64,
}

impl Tick {
    /// Delta time in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// Tracks frame timing and produces one [`Tick`] per frame
pub struct FrameTimer {
    start: Instant,
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
}

impl FrameTimer {
    /// Create a new frame timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Call once per frame; returns the tick for the new frame
    pub fn tick(&mut self) -> Tick {
        let now = Instant::now();
        self.delta = now - self.last_frame;
        self.last_frame = now;
        self.frame_count += 1;

        self.current()
    }

    /// The tick of the most recent frame without advancing
    pub fn current(&self) -> Tick {
        Tick {
            total: self.last_frame - self.start,
            delta: self.delta,
            frame: self.frame_count,
        }
    }

    /// Get total frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
