//! # Host Loop
//!
//! A tick source for hosts without an engine of their own, and the
//! reference for hosts that have one:
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. UPDATE                                                           │
//! │    └─ Update listeners (tick-bound services, input, gameplay)       │
//! │                                                                     │
//! │ 2. FIXED STEPS (0..N, from the accumulator)                         │
//! │    ├─ FixedUpdate listeners                                         │
//! │    └─ TimerScheduler::advance(fixed step, scaled)                   │
//! │                                                                     │
//! │ 3. LATE UPDATE                                                      │
//! │    └─ LateUpdate listeners (cameras, presentation)                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The real frame delta is clamped to `frame.max_delta_ms` before it enters
//! the accumulator, so one stalled frame costs at most a bounded number of
//! fixed steps.

use std::time::{Duration, Instant};

use crate::runtime::Runtime;

/// Work time above which a frame is reported as slow.
pub const SLOW_FRAME_BUDGET: Duration = Duration::from_millis(33);

/// What happened during one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Real delta after clamping.
    pub delta: Duration,
    /// Fixed steps run this frame.
    pub fixed_steps: u32,
    /// Timer callbacks run this frame.
    pub timers_fired: usize,
    /// Time spent inside the runtime, in microseconds.
    pub work_us: u64,
}

/// Running totals over many frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStatsAccumulator {
    /// Frames recorded.
    pub frames_recorded: u64,
    /// Fixed steps over all frames.
    pub fixed_steps: u64,
    /// Timer callbacks over all frames.
    pub timers_fired: u64,
    /// Largest single-frame work time, in microseconds.
    pub max_work_us: u64,
    /// Frames over [`SLOW_FRAME_BUDGET`].
    pub slow_frames: u64,
}

impl FrameStatsAccumulator {
    /// Records one frame.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.fixed_steps += u64::from(stats.fixed_steps);
        self.timers_fired += stats.timers_fired as u64;
        self.max_work_us = self.max_work_us.max(stats.work_us);
        if stats.work_us > duration_us(SLOW_FRAME_BUDGET) {
            self.slow_frames += 1;
        }
    }
}

/// Drives a [`Runtime`] one frame at a time.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tickwork::{HostLoop, Runtime};
///
/// let mut host = HostLoop::new(Runtime::new());
/// let stats = host.frame(Duration::from_millis(50));
/// // default fixed step is 20ms
/// assert_eq!(stats.fixed_steps, 2);
/// ```
pub struct HostLoop {
    runtime: Runtime,
    fixed_step: Duration,
    max_delta: Duration,
    accumulator: Duration,
    frame_count: u64,
    last_frame: Option<Instant>,
    stats: FrameStatsAccumulator,
}

impl HostLoop {
    /// Creates a loop that takes its step sizes from the runtime's config.
    #[must_use]
    pub fn new(runtime: Runtime) -> Self {
        let frame = &runtime.config().frame;
        let (fixed_step, max_delta) = (frame.fixed_step(), frame.max_delta());
        tracing::debug!(?fixed_step, ?max_delta, "host loop created");
        Self {
            runtime,
            fixed_step,
            max_delta,
            accumulator: Duration::ZERO,
            frame_count: 0,
            last_frame: None,
            stats: FrameStatsAccumulator::default(),
        }
    }

    /// The runtime this loop drives.
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Runs one frame of `real_delta` wall-clock time.
    ///
    /// # Arguments
    ///
    /// * `real_delta` - Time since the previous frame, clamped to `max_delta`
    pub fn frame(&mut self, real_delta: Duration) -> FrameStats {
        let started = Instant::now();
        let delta = real_delta.min(self.max_delta);
        self.accumulator += delta;

        let frames = self.runtime.frames();
        frames.update();

        let mut fixed_steps = 0;
        let mut timers_fired = 0;
        while self.accumulator >= self.fixed_step {
            self.accumulator -= self.fixed_step;
            timers_fired += frames.fixed_update_with(frames.frame_time(self.fixed_step));
            fixed_steps += 1;
        }

        frames.late_update();

        let stats = FrameStats {
            frame: self.frame_count,
            delta,
            fixed_steps,
            timers_fired,
            work_us: duration_us(started.elapsed()),
        };
        self.end_frame(stats);
        stats
    }

    /// Runs one frame measured against the real clock. The first call runs
    /// a zero-length frame.
    pub fn tick(&mut self) -> FrameStats {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_frame = Some(now);
        self.frame(delta)
    }

    /// Runs `count` frames of `frame_duration` each on a simulated clock.
    pub fn run_frames(&mut self, count: u64, frame_duration: Duration) -> &FrameStatsAccumulator {
        for _ in 0..count {
            let _ = self.frame(frame_duration);
        }
        &self.stats
    }

    fn end_frame(&mut self, stats: FrameStats) {
        self.frame_count += 1;
        self.stats.record(stats);

        if stats.work_us > duration_us(SLOW_FRAME_BUDGET) {
            tracing::warn!(
                frame = stats.frame,
                work_ms = stats.work_us as f64 / 1000.0,
                budget_ms = duration_us(SLOW_FRAME_BUDGET) as f64 / 1000.0,
                "frame exceeded budget"
            );
        }
    }

    /// Frames run so far.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Time carried over to the next frame's fixed steps.
    #[inline]
    #[must_use]
    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    /// Totals since the loop was created.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
