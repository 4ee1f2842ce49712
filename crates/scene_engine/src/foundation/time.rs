//! Frame timing

use std::time::Instant;

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
    fps: FpsCounter,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            fps: FpsCounter::new(0.5),
        }
    }

    /// Advance the timer by one frame
    pub fn tick(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.advance(elapsed);
    }

    fn advance(&mut self, elapsed: f32) {
        self.delta_time = elapsed;
        self.total_time += elapsed;
        self.frame_count += 1;
        self.fps.record(elapsed);
    }

    /// Seconds since the previous tick
    #[must_use]
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds since creation
    #[must_use]
    pub const fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of ticks so far
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames per second averaged over the last completed sample window
    #[must_use]
    pub const fn fps(&self) -> f32 {
        self.fps.value
    }

    /// Returns `true` once per sample window, when [`Timer::fps`] changed
    pub fn take_fps_update(&mut self) -> bool {
        std::mem::take(&mut self.fps.updated)
    }
}

/// Averages frame rate over fixed sample windows
struct FpsCounter {
    window: f32,
    elapsed: f32,
    frames: u32,
    value: f32,
    updated: bool,
}

impl FpsCounter {
    const fn new(window: f32) -> Self {
        Self {
            window,
            elapsed: 0.0,
            frames: 0,
            value: 0.0,
            updated: false,
        }
    }

    fn record(&mut self, dt: f32) {
        self.elapsed += dt;
        self.frames += 1;
        if self.elapsed >= self.window {
            self.value = self.frames as f32 / self.elapsed;
            self.elapsed = 0.0;
            self.frames = 0;
            self.updated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_accumulates() {
        let mut timer = Timer::new();
        timer.advance(0.25);
        timer.advance(0.25);

        assert_eq!(timer.frame_count(), 2);
        assert!((timer.total_time() - 0.5).abs() < 1e-6);
        assert!((timer.delta_time() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_fps_reported_once_per_window() {
        let mut timer = Timer::new();
        for _ in 0..3 {
            timer.advance(0.125);
        }
        assert!(!timer.take_fps_update());

        timer.advance(0.125);
        assert!(timer.take_fps_update());
        assert!((timer.fps() - 8.0).abs() < 1e-3);
        assert!(!timer.take_fps_update());
    }
}
