//! # Timer Scheduler Service
//!
//! Records live in a `BTreeMap` keyed by id, so they advance in creation
//! order. Callbacks that come due are collected under the lock and run
//! after it is released; a callback may create, stop or remove timers,
//! including its own.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::record::{Due, TimerRecord};
use super::{TimeMode, TimerCallback, TimerId, TimerSpec};
use crate::error::{TimerError, TimerResult};
use crate::frame::FrameTime;
use crate::pool::ObjectPool;
use crate::registry::{Service, ServiceRegistry};

/// Pool bucket that recycles timer records.
const RECORD_BUCKET: &str = "timer_record";
/// Pool namespace reserved for the runtime's own buckets.
const POOL_NAMESPACE: &str = "tickwork";

#[derive(Default)]
struct SchedulerInner {
    records: BTreeMap<TimerId, TimerRecord>,
    next_id: u64,
}

impl SchedulerInner {
    fn allocate_id(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

/// Delayed and repeating callbacks, advanced by the
/// [`FrameDispatcher`](crate::FrameDispatcher) after each fixed update.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tickwork_core::{FrameTime, ServiceRegistry, TimeMode, TimerScheduler};
///
/// let registry = ServiceRegistry::new();
/// let timers = registry.get::<TimerScheduler>();
///
/// let fired = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&fired);
/// timers
///     .create_timer(TimeMode::Scaled, 500, move |_| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }, 0, None)
///     .unwrap();
///
/// timers.advance(FrameTime::uniform(Duration::from_millis(500)));
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// assert!(timers.is_empty());
/// ```
pub struct TimerScheduler {
    inner: Mutex<SchedulerInner>,
    pool: Arc<ObjectPool>,
    max_catch_up: usize,
}

impl Service for TimerScheduler {
    fn construct(registry: &ServiceRegistry) -> Self {
        let max_catch_up = usize::try_from(registry.config().timers.max_catch_up).unwrap_or(usize::MAX);
        Self::with_pool(registry.get::<ObjectPool>(), max_catch_up)
    }
}

impl TimerScheduler {
    pub(crate) fn with_pool(pool: Arc<ObjectPool>, max_catch_up: usize) -> Self {
        tracing::debug!(max_catch_up, "timer scheduler created");
        Self {
            inner: Mutex::new(SchedulerInner::default()),
            pool,
            max_catch_up: max_catch_up.max(1),
        }
    }

    /// Boundaries one record may fire in a single advance.
    #[inline]
    #[must_use]
    pub fn max_catch_up(&self) -> usize {
        self.max_catch_up
    }

    // =========================================================================
    // Creation and removal
    // =========================================================================

    /// Creates a running timer from `spec`.
    ///
    /// # Errors
    ///
    /// - [`TimerError::ZeroInterval`] if an interval of zero was requested
    /// - [`TimerError::ZeroPeriod`] for a repeating timer of zero duration
    pub fn create(&self, spec: TimerSpec) -> TimerResult<TimerId> {
        if spec.interval == Some(Duration::ZERO) {
            tracing::warn!(?spec, "timer rejected");
            return Err(TimerError::ZeroInterval);
        }
        if spec.repeat && spec.duration.is_zero() {
            tracing::warn!(?spec, "timer rejected");
            return Err(TimerError::ZeroPeriod);
        }

        let mut record: TimerRecord = self.pool.acquire_in(RECORD_BUCKET, POOL_NAMESPACE);
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        tracing::debug!(timer = %id, ?spec, "timer created");
        record.arm(id, spec);
        inner.records.insert(id, record);
        Ok(id)
    }

    /// Creates a running timer of `total_ms` milliseconds.
    ///
    /// With `interval_ms > 0` the timer fires `on_interval` every
    /// `interval_ms` and repeats after each completion until removed.
    /// With `interval_ms == 0` it completes once and is removed.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::ZeroPeriod`] for an interval timer with
    /// `total_ms == 0`.
    pub fn create_timer<F>(
        &self,
        mode: TimeMode,
        total_ms: u64,
        on_complete: F,
        interval_ms: u64,
        on_interval: Option<TimerCallback>,
    ) -> TimerResult<TimerId>
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        let total = Duration::from_millis(total_ms);
        let mut spec = if interval_ms > 0 {
            TimerSpec::repeating(total).interval(Duration::from_millis(interval_ms))
        } else {
            TimerSpec::once(total)
        };
        spec = spec.mode(mode).on_complete(on_complete);
        spec.on_interval = on_interval;
        self.create(spec)
    }

    /// Removes a timer for good. Callbacks of this timer that are already
    /// due in the current advance are skipped.
    ///
    /// A one-shot that completed in the current advance stays live until
    /// that advance has run its callbacks, so it can still be removed here.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnknownTimer`] if `id` is not live.
    pub fn remove_timer(&self, id: TimerId) -> TimerResult<()> {
        let removed = self.inner.lock().records.remove(&id);
        let Some(record) = removed else {
            return Err(unknown("remove", id));
        };
        record.cancelled.store(true, Ordering::Release);
        self.recycle(record);
        tracing::debug!(timer = %id, "timer removed");
        Ok(())
    }

    /// Removes every timer. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let records = std::mem::take(&mut self.inner.lock().records);
        let count = records.len();
        for record in records.into_values() {
            record.cancelled.store(true, Ordering::Release);
            self.recycle(record);
        }
        if count > 0 {
            tracing::debug!(count, "timers cleared");
        }
        count
    }

    fn recycle(&self, record: TimerRecord) {
        // Resetting drops the callbacks, which must not happen under our lock.
        let _ = self.pool.release_in(RECORD_BUCKET, POOL_NAMESPACE, record);
    }

    // =========================================================================
    // Run state
    // =========================================================================

    /// Resumes a paused timer. Starting a running timer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnknownTimer`] if `id` is not live.
    pub fn start_timer(&self, id: TimerId) -> TimerResult<()> {
        self.with_record("start", id, |record| record.running = !record.finished)
    }

    /// Pauses a timer, keeping its elapsed time.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnknownTimer`] if `id` is not live.
    pub fn stop_timer(&self, id: TimerId) -> TimerResult<()> {
        self.with_record("stop", id, |record| record.running = false)
    }

    /// Rewinds a timer to zero elapsed time and sets it running.
    ///
    /// A one-shot rewound before its completing advance ends is kept and
    /// runs again.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnknownTimer`] if `id` is not live.
    pub fn reset_timer(&self, id: TimerId) -> TimerResult<()> {
        self.with_record("reset", id, |record| {
            record.elapsed = Duration::ZERO;
            record.running = true;
            record.finished = false;
        })
    }

    /// Pauses every timer.
    pub fn stop_all(&self) {
        self.set_all_running(false);
    }

    /// Resumes every timer.
    pub fn start_all(&self) {
        self.set_all_running(true);
    }

    fn set_all_running(&self, running: bool) {
        let mut inner = self.inner.lock();
        for record in inner.records.values_mut().filter(|record| !record.finished) {
            record.running = running;
        }
        tracing::debug!(running, count = inner.records.len(), "all timers toggled");
    }

    fn with_record<F>(&self, op: &'static str, id: TimerId, f: F) -> TimerResult<()>
    where
        F: FnOnce(&mut TimerRecord),
    {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(&id) {
            Some(record) => {
                f(record);
                Ok(())
            }
            None => Err(unknown(op, id)),
        }
    }

    // =========================================================================
    // Advance
    // =========================================================================

    /// Moves every running timer forward and runs the callbacks that came
    /// due. Returns how many callbacks ran to completion.
    ///
    /// Scaled timers take `time.scaled`, wall-clock timers `time.real`.
    /// Timers created by a callback start counting from the next advance.
    /// A callback that panics is logged and the remaining callbacks still run.
    pub fn advance(&self, time: FrameTime) -> usize {
        let mut due: Vec<Due> = Vec::new();
        let completed: Vec<TimerId> = {
            let mut inner = self.inner.lock();
            let mut completed = Vec::new();
            for record in inner.records.values_mut() {
                let delta = match record.mode {
                    TimeMode::Scaled => time.scaled,
                    TimeMode::WallClock => time.real,
                };
                let outcome = record.step(delta, self.max_catch_up, &mut due);
                if outcome.skipped {
                    tracing::warn!(
                        timer = %record.id,
                        fired = outcome.fired,
                        "timer fell behind, backlog skipped"
                    );
                }
                if outcome.finished {
                    completed.push(record.id);
                }
            }
            completed
        };

        let mut invoked = 0;
        for Due {
            id,
            callback,
            cancelled,
        } in due
        {
            if cancelled.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(id))) {
                Ok(()) => invoked += 1,
                Err(_) => tracing::error!(timer = %id, "timer callback panicked"),
            }
        }

        // Finished one-shots stay live until their callbacks ran, so a
        // callback earlier in this advance could still remove them.
        if !completed.is_empty() {
            let mut finished = Vec::with_capacity(completed.len());
            {
                let mut inner = self.inner.lock();
                for id in &completed {
                    if inner.records.get(id).is_some_and(|record| record.finished) {
                        finished.extend(inner.records.remove(id));
                    }
                }
            }
            for record in finished {
                tracing::debug!(timer = %record.id, "one-shot timer completed");
                self.recycle(record);
            }
        }
        invoked
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of live timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns `true` if no timer is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` is live.
    #[must_use]
    pub fn contains(&self, id: TimerId) -> bool {
        self.inner.lock().records.contains_key(&id)
    }

    /// Whether `id` is running, `None` if it is not live.
    #[must_use]
    pub fn is_running(&self, id: TimerId) -> Option<bool> {
        self.inner.lock().records.get(&id).map(|record| record.running)
    }

    /// Elapsed time within the current period, `None` if `id` is not live.
    #[must_use]
    pub fn elapsed(&self, id: TimerId) -> Option<Duration> {
        self.inner.lock().records.get(&id).map(|record| record.elapsed)
    }
}

fn unknown(op: &'static str, id: TimerId) -> TimerError {
    tracing::warn!(timer = %id, op, "operation on unknown timer");
    TimerError::UnknownTimer(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> Arc<TimerScheduler> {
        Arc::new(TimerScheduler::with_pool(Arc::new(ObjectPool::with_max_idle(16)), 64))
    }

    fn ms(value: u64) -> FrameTime {
        FrameTime::uniform(Duration::from_millis(value))
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(TimerId) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&count);
        (count, move |_| {
            probe.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_interval_timer_fires_four_times_then_completes() {
        let timers = scheduler();
        let (completes, on_complete) = counter();
        let (intervals, on_interval) = counter();
        let id = timers
            .create_timer(TimeMode::Scaled, 1000, on_complete, 250, Some(Arc::new(on_interval)))
            .unwrap();

        for step in 1..=4 {
            let _ = timers.advance(ms(250));
            assert_eq!(intervals.load(Ordering::SeqCst), step);
            let expected = usize::from(step == 4);
            assert_eq!(completes.load(Ordering::SeqCst), expected);
        }
        // interval timers keep going
        assert!(timers.contains(id));
        assert_eq!(timers.elapsed(id), Some(Duration::ZERO));
    }

    #[test]
    fn test_one_shot_removed_after_completion() {
        let timers = scheduler();
        let (completes, on_complete) = counter();
        let id = timers.create_timer(TimeMode::Scaled, 100, on_complete, 0, None).unwrap();

        assert_eq!(timers.advance(ms(60)), 0);
        assert_eq!(timers.advance(ms(60)), 1);
        assert!(!timers.contains(id));

        let _ = timers.advance(ms(500));
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_timer_cannot_be_started() {
        let timers = scheduler();
        let id = timers.create_timer(TimeMode::Scaled, 100, |_| {}, 0, None).unwrap();
        timers.remove_timer(id).unwrap();

        assert_eq!(timers.start_timer(id), Err(TimerError::UnknownTimer(id)));
        assert_eq!(timers.remove_timer(id), Err(TimerError::UnknownTimer(id)));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let timers = scheduler();
        let first = timers.create_timer(TimeMode::Scaled, 10, |_| {}, 0, None).unwrap();
        timers.remove_timer(first).unwrap();
        let second = timers.create_timer(TimeMode::Scaled, 10, |_| {}, 0, None).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_stop_start_and_reset() {
        let timers = scheduler();
        let (completes, on_complete) = counter();
        let id = timers.create_timer(TimeMode::Scaled, 100, on_complete, 0, None).unwrap();

        let _ = timers.advance(ms(50));
        timers.stop_timer(id).unwrap();
        assert_eq!(timers.is_running(id), Some(false));
        let _ = timers.advance(ms(500));
        assert_eq!(timers.elapsed(id), Some(Duration::from_millis(50)));

        timers.reset_timer(id).unwrap();
        assert_eq!(timers.is_running(id), Some(true));
        let _ = timers.advance(ms(99));
        assert_eq!(completes.load(Ordering::SeqCst), 0);
        let _ = timers.advance(ms(1));
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_all_and_start_all() {
        let timers = scheduler();
        let (completes, on_complete) = counter();
        let on_complete = Arc::new(on_complete);
        for _ in 0..3 {
            let callback = Arc::clone(&on_complete);
            let _ = timers
                .create_timer(TimeMode::Scaled, 10, move |id| callback(id), 0, None)
                .unwrap();
        }

        timers.stop_all();
        let _ = timers.advance(ms(100));
        assert_eq!(completes.load(Ordering::SeqCst), 0);

        timers.start_all();
        let _ = timers.advance(ms(100));
        assert_eq!(completes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wall_clock_ignores_time_scale() {
        let timers = scheduler();
        let (scaled, on_scaled) = counter();
        let (wall, on_wall) = counter();
        let _ = timers.create_timer(TimeMode::Scaled, 100, on_scaled, 0, None).unwrap();
        let _ = timers.create_timer(TimeMode::WallClock, 100, on_wall, 0, None).unwrap();

        // time scale 0: scaled time stands still
        let _ = timers.advance(FrameTime::new(Duration::from_millis(100), Duration::ZERO));
        assert_eq!(scaled.load(Ordering::SeqCst), 0);
        assert_eq!(wall.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_timers_rejected() {
        let timers = scheduler();
        assert_eq!(
            timers.create_timer(TimeMode::Scaled, 0, |_| {}, 10, None),
            Err(TimerError::ZeroPeriod)
        );
        assert_eq!(
            timers.create(TimerSpec::once(Duration::from_millis(5)).interval(Duration::ZERO)),
            Err(TimerError::ZeroInterval)
        );
    }

    #[test]
    fn test_callback_may_remove_itself_and_create_others() {
        let timers = scheduler();
        let (spawned, on_spawned) = counter();
        let on_spawned = Arc::new(on_spawned);
        let handle = Arc::clone(&timers);
        let id = timers
            .create(TimerSpec::repeating(Duration::from_millis(10)).on_complete(move |id| {
                handle.remove_timer(id).unwrap();
                let callback = Arc::clone(&on_spawned);
                let _ = handle
                    .create_timer(TimeMode::Scaled, 10, move |id| callback(id), 0, None)
                    .unwrap();
            }))
            .unwrap();

        // the removed timer's backlog is skipped
        let _ = timers.advance(ms(50));
        assert!(!timers.contains(id));
        assert_eq!(timers.len(), 1);
        assert_eq!(spawned.load(Ordering::SeqCst), 0);

        let _ = timers.advance(ms(10));
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_callback_removes_one_shot_finishing_in_same_advance() {
        let timers = scheduler();
        let (victim_fired, on_victim) = counter();
        let target = Arc::new(Mutex::new(None::<TimerId>));
        let removed = Arc::new(Mutex::new(None::<TimerResult<()>>));

        let handle = Arc::clone(&timers);
        let (slot, result) = (Arc::clone(&target), Arc::clone(&removed));
        let _ = timers
            .create_timer(TimeMode::Scaled, 10, move |_| {
                if let Some(victim) = *slot.lock() {
                    *result.lock() = Some(handle.remove_timer(victim));
                }
            }, 0, None)
            .unwrap();
        let victim = timers.create_timer(TimeMode::Scaled, 10, on_victim, 0, None).unwrap();
        *target.lock() = Some(victim);

        assert_eq!(timers.advance(ms(10)), 1);
        assert_eq!(*removed.lock(), Some(Ok(())));
        assert_eq!(victim_fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_one_shot_is_live_inside_its_own_callback() {
        let timers = scheduler();
        let seen = Arc::new(Mutex::new(None::<(bool, Option<bool>)>));
        let handle = Arc::clone(&timers);
        let sink = Arc::clone(&seen);
        let id = timers
            .create_timer(TimeMode::Scaled, 10, move |id| {
                *sink.lock() = Some((handle.contains(id), handle.is_running(id)));
            }, 0, None)
            .unwrap();

        let _ = timers.advance(ms(10));
        assert_eq!(*seen.lock(), Some((true, Some(false))));
        assert!(!timers.contains(id));
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let timers = scheduler();
        let (completes, on_complete) = counter();
        let _ = timers
            .create_timer(TimeMode::Scaled, 10, |_| panic!("timer boom"), 0, None)
            .unwrap();
        let _ = timers.create_timer(TimeMode::Scaled, 10, on_complete, 0, None).unwrap();

        assert_eq!(timers.advance(ms(10)), 1);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_records_are_recycled_through_pool() {
        let pool = Arc::new(ObjectPool::with_max_idle(16));
        let timers = TimerScheduler::with_pool(Arc::clone(&pool), 64);

        let _ = timers.create_timer(TimeMode::Scaled, 10, |_| {}, 0, None).unwrap();
        let _ = timers.advance(ms(10));
        assert_eq!(pool.idle_count(RECORD_BUCKET, POOL_NAMESPACE), 1);

        let _ = timers.create_timer(TimeMode::Scaled, 10, |_| {}, 0, None).unwrap();
        let stats = pool.stats(RECORD_BUCKET, POOL_NAMESPACE).unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
    }

    #[test]
    fn test_large_delta_is_bounded_by_catch_up() {
        let timers = TimerScheduler::with_pool(Arc::new(ObjectPool::with_max_idle(4)), 8);
        let (intervals, on_interval) = counter();
        let id = timers
            .create(
                TimerSpec::repeating(Duration::from_secs(1))
                    .interval(Duration::from_millis(10))
                    .on_interval(on_interval),
            )
            .unwrap();

        let _ = timers.advance(ms(10_005));
        assert_eq!(intervals.load(Ordering::SeqCst), 8);
        assert!(timers.elapsed(id).unwrap() < Duration::from_secs(1));
    }
}
