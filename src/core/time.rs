//! Frame timing and fixed-step accumulation

use std::time::{Duration, Instant};

/// Upper bound on fixed steps run in one frame after a long stall
const MAX_FIXED_STEPS_PER_FRAME: u32 = 8;

/// Frame clock
#[derive(Debug, Clone)]
pub struct Time {
    last_instant: Option<Instant>,
    delta: Duration,
    elapsed: Duration,
    frame_count: u64,
    /// Seconds per fixed update
    fixed_step: f32,
    accumulator: f32,
}

impl Time {
    pub fn new(fixed_step: f32) -> Self {
        Self {
            last_instant: None,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
            fixed_step: fixed_step.max(f32::EPSILON),
            accumulator: 0.0,
        }
    }

    /// Advance by wall-clock time since the previous call.
    ///
    /// The first call reports a zero delta.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let delta = self
            .last_instant
            .map_or(Duration::ZERO, |last| now.duration_since(last));
        self.last_instant = Some(now);
        self.advance(delta);
    }

    /// Advance by an explicit delta
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.elapsed += delta;
        self.frame_count += 1;
        self.accumulator += delta.as_secs_f32();
    }

    /// Number of fixed steps due this frame, consuming them from the
    /// accumulator. Excess time beyond the per-frame cap is dropped.
    pub fn drain_fixed_steps(&mut self) -> u32 {
        let mut steps = 0;
        while self.accumulator >= self.fixed_step {
            self.accumulator -= self.fixed_step;
            steps += 1;
            if steps == MAX_FIXED_STEPS_PER_FRAME {
                self.accumulator %= self.fixed_step;
                break;
            }
        }
        steps
    }

    /// Frame delta in seconds
    #[must_use]
    #[inline]
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    #[must_use]
    #[inline]
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Total time since start in seconds
    #[must_use]
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[must_use]
    pub fn fixed_step(&self) -> f32 {
        self.fixed_step
    }

    /// Current frames per second based on the last delta
    #[must_use]
    pub fn fps(&self) -> f32 {
        let secs = self.delta.as_secs_f32();
        if secs > 0.0 { 1.0 / secs } else { 0.0 }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(1.0 / 50.0)
    }
}
