//! # Frame Dispatch
//!
//! The host's per-frame signals, fanned out to registered listeners.
//!
//! ```text
//! Host frame:
//! ┌───────────────────────────────────────────────────────────────┐
//! │ 1. update()            Update listeners                       │
//! │ 2. fixed_update() x N  FixedUpdate listeners                  │
//! │                        └─ TimerScheduler::advance(FrameTime)  │
//! │ 3. late_update()       LateUpdate listeners                   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners run in registration order. A listener added during a pass is
//! first called on the next pass; a listener removed during a pass is not
//! called again, even if the pass has not reached it yet.

mod clock;
mod dispatcher;

use std::fmt;
use std::time::Duration;

pub use clock::FrameClock;
pub use dispatcher::FrameDispatcher;

/// One of the three per-frame signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickPhase {
    /// Once per rendered frame.
    Update,
    /// Once per fixed simulation step. Timers advance after this pass.
    FixedUpdate,
    /// Once per rendered frame, after `Update`.
    LateUpdate,
}

impl TickPhase {
    /// All phases in frame order.
    pub const ALL: [TickPhase; 3] = [TickPhase::Update, TickPhase::FixedUpdate, TickPhase::LateUpdate];

    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            TickPhase::Update => 0,
            TickPhase::FixedUpdate => 1,
            TickPhase::LateUpdate => 2,
        }
    }
}

/// Time elapsed since the previous fixed tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTime {
    /// Wall-clock time.
    pub real: Duration,
    /// Wall-clock time multiplied by the time scale.
    pub scaled: Duration,
}

impl FrameTime {
    /// Creates a frame time from its two components.
    #[inline]
    #[must_use]
    pub const fn new(real: Duration, scaled: Duration) -> Self {
        Self { real, scaled }
    }

    /// A frame time with a time scale of exactly 1.
    #[inline]
    #[must_use]
    pub const fn uniform(delta: Duration) -> Self {
        Self::new(delta, delta)
    }
}

/// Handle for a frame listener, returned by
/// [`FrameDispatcher::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameListenerId(u64);

impl fmt::Display for FrameListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-listener#{}", self.0)
    }
}
