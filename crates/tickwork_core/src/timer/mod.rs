//! # Timer Scheduler
//!
//! Delayed and repeating callbacks driven by the frame dispatcher's clock.
//!
//! ## Record lifecycle
//!
//! ```text
//!            create_timer
//!                 │
//!                 ▼
//!   reset ──> ┌─────────┐  stop   ┌────────┐
//!   (0 ms)    │ Running │───────> │ Paused │
//!             │         │ <───────│        │
//!             └────┬────┘  start  └───┬────┘
//!                  │ complete          │
//!                  │ (one-shot)        │ remove
//!                  ▼                   ▼
//!             ┌──────────────────────────┐
//!             │ Removed (id never reused)│
//!             └──────────────────────────┘
//! ```
//!
//! ## Advance
//!
//! For each running record:
//! 1. add the scaled delta (or the real delta for [`TimeMode::WallClock`])
//! 2. fire `on_interval` once for **every** interval boundary crossed
//! 3. at the total, fire `on_complete`, then remove (one-shot) or wrap
//!    around and keep going (repeating)
//!
//! A huge delta fires each crossed boundary separately, up to
//! `timers.max_catch_up` firings per record per advance; the backlog past
//! that is skipped with a warning.
//!
//! Timer records are recycled through the [`ObjectPool`](crate::ObjectPool).

mod record;
mod scheduler;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use scheduler::TimerScheduler;

/// Identifier of a timer record. Assigned monotonically, never reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Which clock a timer follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimeMode {
    /// Host time, multiplied by the dispatcher's time scale.
    #[default]
    Scaled,
    /// Real elapsed time, ignoring the time scale.
    WallClock,
}

/// Callback invoked by a timer with its own id.
pub type TimerCallback = Arc<dyn Fn(TimerId) + Send + Sync>;

/// Description of a timer to create.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tickwork_core::{TimeMode, TimerSpec};
///
/// let spec = TimerSpec::repeating(Duration::from_secs(1))
///     .mode(TimeMode::WallClock)
///     .interval(Duration::from_millis(250))
///     .on_interval(|id| println!("{id} quarter"))
///     .on_complete(|id| println!("{id} second"));
/// # let _ = spec;
/// ```
#[derive(Clone)]
pub struct TimerSpec {
    pub(crate) mode: TimeMode,
    pub(crate) duration: Duration,
    pub(crate) interval: Option<Duration>,
    pub(crate) repeat: bool,
    pub(crate) on_complete: Option<TimerCallback>,
    pub(crate) on_interval: Option<TimerCallback>,
}

impl TimerSpec {
    /// A timer that completes once after `duration` and is then removed.
    #[must_use]
    pub fn once(duration: Duration) -> Self {
        Self {
            mode: TimeMode::Scaled,
            duration,
            interval: None,
            repeat: false,
            on_complete: None,
            on_interval: None,
        }
    }

    /// A timer that completes every `period` until removed.
    #[must_use]
    pub fn repeating(period: Duration) -> Self {
        Self {
            repeat: true,
            ..Self::once(period)
        }
    }

    /// Sets the clock the timer follows.
    #[must_use]
    pub fn mode(mut self, mode: TimeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fires `on_interval` every `interval` within each period.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Callback fired when the duration elapses.
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    /// Callback fired at each interval boundary.
    #[must_use]
    pub fn on_interval<F>(mut self, callback: F) -> Self
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        self.on_interval = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for TimerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSpec")
            .field("mode", &self.mode)
            .field("duration", &self.duration)
            .field("interval", &self.interval)
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}
