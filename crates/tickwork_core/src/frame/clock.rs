//! Host time to [`FrameTime`] conversion.

use std::time::{Duration, Instant};

use super::FrameTime;
use crate::config::FrameConfig;

/// Turns host timestamps into clamped, scaled frame times.
///
/// The real delta is clamped to `max_delta` first, so a debugger pause or
/// a stalled host does not dump seconds of time into the timers at once.
#[derive(Clone, Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    time_scale: f32,
    max_delta: Duration,
}

impl FrameClock {
    /// Creates a clock. An invalid `time_scale` falls back to 1.
    #[must_use]
    pub fn new(time_scale: f32, max_delta: Duration) -> Self {
        let mut clock = Self {
            last: None,
            time_scale: 1.0,
            max_delta,
        };
        let _ = clock.set_time_scale(time_scale);
        clock
    }

    /// Creates a clock from the `[frame]` configuration section.
    #[must_use]
    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.time_scale, config.max_delta())
    }

    /// Frame time since the previous call. The first call returns zero.
    pub fn tick(&mut self, now: Instant) -> FrameTime {
        let real = self
            .last
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last = Some(now);
        self.measure(real)
    }

    /// Clamps and scales a real delta without touching the clock's timestamp.
    #[must_use]
    pub fn measure(&self, real: Duration) -> FrameTime {
        let real = real.min(self.max_delta);
        // unit scale stays exact, float round-trips can lose a nanosecond
        if (self.time_scale - 1.0).abs() < f32::EPSILON {
            return FrameTime::uniform(real);
        }
        let scaled = Duration::try_from_secs_f64(real.as_secs_f64() * f64::from(self.time_scale))
            .unwrap_or(Duration::MAX);
        FrameTime::new(real, scaled)
    }

    /// Current time scale.
    #[inline]
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Sets the time scale. `0` pauses scaled time.
    ///
    /// Returns `false` and keeps the old scale if `scale` is negative or
    /// not finite.
    pub fn set_time_scale(&mut self, scale: f32) -> bool {
        if !scale.is_finite() || scale < 0.0 {
            tracing::warn!(scale, "time scale rejected");
            return false;
        }
        self.time_scale = scale;
        true
    }

    /// Largest real delta a single tick reports.
    #[inline]
    #[must_use]
    pub fn max_delta(&self) -> Duration {
        self.max_delta
    }

    /// Forgets the previous timestamp; the next tick returns zero.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::from_config(&FrameConfig::default())
    }
}
