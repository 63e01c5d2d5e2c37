//! Timer record state and the per-advance step.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use super::{TimeMode, TimerCallback, TimerId, TimerSpec};
use crate::pool::Poolable;

/// A callback that came due during a step, invoked after the scheduler
/// lock is released.
pub(crate) struct Due {
    pub(crate) id: TimerId,
    pub(crate) callback: TimerCallback,
    /// Set when the record is removed before the callback runs.
    pub(crate) cancelled: Arc<AtomicBool>,
}

/// What happened to a record during one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct StepOutcome {
    /// Boundaries crossed, fired or not (a record may have no callbacks).
    pub(crate) fired: usize,
    /// One-shot record completed and must be removed.
    pub(crate) finished: bool,
    /// The catch-up budget ran out and the backlog was dropped.
    pub(crate) skipped: bool,
}

/// Mutable state behind one [`TimerId`]. Recycled through the object pool.
#[derive(Default)]
pub(crate) struct TimerRecord {
    pub(crate) id: TimerId,
    pub(crate) mode: TimeMode,
    pub(crate) total: Duration,
    pub(crate) elapsed: Duration,
    pub(crate) interval: Option<Duration>,
    pub(crate) repeat: bool,
    pub(crate) running: bool,
    /// One-shot record that completed and waits for its callbacks to run.
    pub(crate) finished: bool,
    pub(crate) on_complete: Option<TimerCallback>,
    pub(crate) on_interval: Option<TimerCallback>,
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl Poolable for TimerRecord {
    fn reset(&mut self) {
        // The cancel flag survives; `arm` decides whether it can be reused.
        self.id = TimerId::default();
        self.mode = TimeMode::default();
        self.total = Duration::ZERO;
        self.elapsed = Duration::ZERO;
        self.interval = None;
        self.repeat = false;
        self.running = false;
        self.finished = false;
        self.on_complete = None;
        self.on_interval = None;
    }
}

impl TimerRecord {
    /// Fills a blank record from `spec`. The record starts running.
    ///
    /// The cancel flag is cleared in place unless a [`Due`] of the previous
    /// owner still holds it, in which case the record gets a fresh one.
    pub(crate) fn arm(&mut self, id: TimerId, spec: TimerSpec) {
        match Arc::get_mut(&mut self.cancelled) {
            Some(flag) => *flag.get_mut() = false,
            None => self.cancelled = Arc::new(AtomicBool::new(false)),
        }
        self.id = id;
        self.mode = spec.mode;
        self.total = spec.duration;
        self.elapsed = Duration::ZERO;
        self.interval = spec.interval;
        self.repeat = spec.repeat;
        self.running = true;
        self.finished = false;
        self.on_complete = spec.on_complete;
        self.on_interval = spec.on_interval;
    }

    /// Advances elapsed time by `delta` and collects every callback due.
    ///
    /// Interval boundaries are `k * interval` for `k >= 1` up to and
    /// including the total; a boundary that coincides with the total fires
    /// `on_interval` before `on_complete`. At most `budget` boundaries are
    /// crossed. Past that the rest of the delta is dropped: a repeating
    /// record lands at the same phase of its period, a one-shot record keeps
    /// its completion due for the next step.
    pub(crate) fn step(&mut self, delta: Duration, budget: usize, due: &mut Vec<Due>) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        if !self.running {
            return outcome;
        }

        let total = self.total.as_nanos();
        let interval = self.interval.map(|i| i.as_nanos()).filter(|i| *i > 0);
        let mut elapsed = self.elapsed.as_nanos();
        let mut target = elapsed.saturating_add(delta.as_nanos());

        loop {
            let next_interval = interval
                .map(|i| (elapsed / i + 1) * i)
                .filter(|boundary| *boundary <= total);
            let next = next_interval.unwrap_or(total);
            if next > target {
                break;
            }
            if outcome.fired >= budget {
                outcome.skipped = true;
                break;
            }

            if next_interval == Some(next) {
                elapsed = next;
                outcome.fired += 1;
                self.push(&self.on_interval, due);
                if next < total {
                    continue;
                }
                if outcome.fired >= budget {
                    outcome.skipped = true;
                    break;
                }
            }

            outcome.fired += 1;
            self.push(&self.on_complete, due);
            if !self.repeat {
                outcome.finished = true;
                self.finished = true;
                self.elapsed = self.total;
                self.running = false;
                return outcome;
            }
            elapsed = 0;
            target -= total;
        }

        self.elapsed = if outcome.skipped {
            if self.repeat {
                // total > 0 is enforced for repeating records at creation
                from_nanos(target % total.max(1))
            } else {
                from_nanos(target.min(total))
            }
        } else {
            from_nanos(target)
        };
        outcome
    }

    fn push(&self, callback: &Option<TimerCallback>, due: &mut Vec<Due>) {
        if let Some(callback) = callback {
            due.push(Due {
                id: self.id,
                callback: Arc::clone(callback),
                cancelled: Arc::clone(&self.cancelled),
            });
        }
    }
}

fn from_nanos(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
