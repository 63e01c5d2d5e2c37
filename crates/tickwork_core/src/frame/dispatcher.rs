//! # Frame Dispatcher Service
//!
//! Three listener lists, one per [`TickPhase`], each behind its own lock.
//! A pass copies the list, releases the lock and then calls the listeners,
//! so a listener may add or remove listeners (itself included) or drive
//! other services freely.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{FrameClock, FrameListenerId, FrameTime, TickPhase};
use crate::registry::{Service, ServiceRegistry};
use crate::timer::TimerScheduler;

type FrameCallback = Box<dyn Fn() + Send + Sync>;

struct FrameListener {
    id: FrameListenerId,
    active: AtomicBool,
    callback: FrameCallback,
}

/// Fans the host's tick signals out to listeners and advances the timers.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use tickwork_core::{FrameDispatcher, ServiceRegistry, TickPhase};
///
/// let registry = ServiceRegistry::new();
/// let frames = registry.get::<FrameDispatcher>();
///
/// let updates = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&updates);
/// let id = frames.add_listener(TickPhase::Update, move || {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
///
/// frames.update();
/// assert!(frames.remove_listener(TickPhase::Update, id));
/// frames.update();
/// assert_eq!(updates.load(Ordering::Relaxed), 1);
/// ```
pub struct FrameDispatcher {
    phases: [Mutex<Vec<Arc<FrameListener>>>; 3],
    next_id: AtomicU64,
    clock: Mutex<FrameClock>,
    timers: Arc<TimerScheduler>,
    frames: AtomicU64,
    fixed_steps: AtomicU64,
    last_fixed: Mutex<FrameTime>,
}

impl Service for FrameDispatcher {
    fn construct(registry: &ServiceRegistry) -> Self {
        Self::new(
            registry.get::<TimerScheduler>(),
            FrameClock::from_config(&registry.config().frame),
        )
    }
}

impl FrameDispatcher {
    pub(crate) fn new(timers: Arc<TimerScheduler>, clock: FrameClock) -> Self {
        tracing::debug!(time_scale = clock.time_scale(), "frame dispatcher created");
        Self {
            phases: Default::default(),
            next_id: AtomicU64::new(1),
            clock: Mutex::new(clock),
            timers,
            frames: AtomicU64::new(0),
            fixed_steps: AtomicU64::new(0),
            last_fixed: Mutex::new(FrameTime::default()),
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers `callback` for every pass of `phase`.
    ///
    /// Added during a pass of the same phase, it is first called on the
    /// next pass.
    pub fn add_listener<F>(&self, phase: TickPhase, callback: F) -> FrameListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = FrameListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.list(phase).lock().push(Arc::new(FrameListener {
            id,
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        }));
        tracing::trace!(listener = %id, ?phase, "frame listener added");
        id
    }

    /// Unregisters a listener. It is not called again, even by a pass that
    /// is running right now.
    ///
    /// Returns `false` if `id` is not registered for `phase`.
    pub fn remove_listener(&self, phase: TickPhase, id: FrameListenerId) -> bool {
        let removed = {
            let mut listeners = self.list(phase).lock();
            listeners
                .iter()
                .position(|listener| listener.id == id)
                .map(|index| listeners.remove(index))
        };
        match removed {
            Some(listener) => {
                listener.active.store(false, Ordering::Release);
                tracing::trace!(listener = %id, ?phase, "frame listener removed");
                true
            }
            None => {
                tracing::debug!(listener = %id, ?phase, "remove of unknown frame listener");
                false
            }
        }
    }

    /// Listeners registered for `phase`.
    #[must_use]
    pub fn listener_count(&self, phase: TickPhase) -> usize {
        self.list(phase).lock().len()
    }

    #[inline]
    fn list(&self, phase: TickPhase) -> &Mutex<Vec<Arc<FrameListener>>> {
        &self.phases[phase.index()]
    }

    // =========================================================================
    // Tick signals
    // =========================================================================

    /// Runs the `Update` pass.
    pub fn update(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        let _ = self.run_pass(TickPhase::Update);
    }

    /// Runs the `LateUpdate` pass.
    pub fn late_update(&self) {
        let _ = self.run_pass(TickPhase::LateUpdate);
    }

    /// Runs the `FixedUpdate` pass and advances the timers by the time
    /// since the previous call. Returns how many timer callbacks ran.
    pub fn fixed_update(&self) -> usize {
        self.fixed_update_at(Instant::now())
    }

    /// Like [`FrameDispatcher::fixed_update`] with an explicit timestamp.
    pub fn fixed_update_at(&self, now: Instant) -> usize {
        let time = self.clock.lock().tick(now);
        self.fixed_update_with(time)
    }

    /// Runs the `FixedUpdate` pass, then advances the timers by `time`.
    ///
    /// Hosts with their own fixed-step accumulator call this directly,
    /// usually with [`FrameDispatcher::frame_time`] of the fixed step.
    pub fn fixed_update_with(&self, time: FrameTime) -> usize {
        self.fixed_steps.fetch_add(1, Ordering::Relaxed);
        *self.last_fixed.lock() = time;
        let _ = self.run_pass(TickPhase::FixedUpdate);
        self.timers.advance(time)
    }

    fn run_pass(&self, phase: TickPhase) -> usize {
        let snapshot: Vec<Arc<FrameListener>> = self.list(phase).lock().clone();
        let mut invoked = 0;
        for listener in snapshot {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (listener.callback)())) {
                Ok(()) => invoked += 1,
                Err(_) => tracing::error!(listener = %listener.id, ?phase, "frame listener panicked"),
            }
        }
        invoked
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Clamps and scales a real delta with the dispatcher's clock.
    #[must_use]
    pub fn frame_time(&self, real: Duration) -> FrameTime {
        self.clock.lock().measure(real)
    }

    /// Current time scale.
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.clock.lock().time_scale()
    }

    /// Sets the time scale; `0` pauses scaled timers while wall-clock
    /// timers keep running. Returns `false` for a negative or non-finite
    /// scale.
    pub fn set_time_scale(&self, scale: f32) -> bool {
        let accepted = self.clock.lock().set_time_scale(scale);
        if accepted {
            tracing::debug!(scale, "time scale changed");
        }
        accepted
    }

    /// Frame time handed to the timers by the latest fixed update.
    #[must_use]
    pub fn last_fixed_time(&self) -> FrameTime {
        *self.last_fixed.lock()
    }

    /// `Update` passes run so far.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// `FixedUpdate` passes run so far.
    #[inline]
    #[must_use]
    pub fn fixed_step_count(&self) -> u64 {
        self.fixed_steps.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::pool::ObjectPool;
    use crate::timer::TimeMode;

    fn dispatcher() -> Arc<FrameDispatcher> {
        let pool = Arc::new(ObjectPool::with_max_idle(8));
        let timers = Arc::new(TimerScheduler::with_pool(pool, 64));
        Arc::new(FrameDispatcher::new(
            timers,
            FrameClock::new(1.0, Duration::from_millis(100)),
        ))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl Fn() + Send + Sync {
        let log = Arc::clone(log);
        move || log.lock().push(name)
    }

    #[test]
    fn test_phases_are_independent() {
        let frames = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = frames.add_listener(TickPhase::Update, recorder(&log, "update"));
        let _ = frames.add_listener(TickPhase::FixedUpdate, recorder(&log, "fixed"));
        let _ = frames.add_listener(TickPhase::LateUpdate, recorder(&log, "late"));

        frames.update();
        let _ = frames.fixed_update_with(FrameTime::uniform(Duration::from_millis(20)));
        frames.late_update();
        assert_eq!(*log.lock(), vec!["update", "fixed", "late"]);
        assert_eq!(frames.frame_count(), 1);
        assert_eq!(frames.fixed_step_count(), 1);
    }

    #[test]
    fn test_registration_order() {
        let frames = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let _ = frames.add_listener(TickPhase::Update, recorder(&log, name));
        }
        frames.update();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_listener_removed_mid_pass_is_skipped() {
        let frames = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim = Arc::new(Mutex::new(None));

        let handle = Arc::clone(&frames);
        let target = Arc::clone(&victim);
        let _ = frames.add_listener(TickPhase::Update, move || {
            if let Some(id) = target.lock().take() {
                assert!(handle.remove_listener(TickPhase::Update, id));
            }
        });
        let id = frames.add_listener(TickPhase::Update, recorder(&log, "victim"));
        *victim.lock() = Some(id);

        frames.update();
        frames.update();
        assert!(log.lock().is_empty());
        assert_eq!(frames.listener_count(TickPhase::Update), 1);
    }

    #[test]
    fn test_listener_added_mid_pass_waits_for_next_pass() {
        let frames = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&frames);
        let counter = Arc::clone(&calls);
        let added = AtomicBool::new(false);
        let _ = frames.add_listener(TickPhase::Update, move || {
            if !added.swap(true, Ordering::SeqCst) {
                let counter = Arc::clone(&counter);
                let _ = handle.add_listener(TickPhase::Update, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        frames.update();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        frames.update();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_unknown_listener() {
        let frames = dispatcher();
        let id = frames.add_listener(TickPhase::Update, || {});
        assert!(!frames.remove_listener(TickPhase::LateUpdate, id));
        assert!(frames.remove_listener(TickPhase::Update, id));
        assert!(!frames.remove_listener(TickPhase::Update, id));
    }

    #[test]
    fn test_fixed_update_advances_timers_after_listeners() {
        let frames = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = frames.add_listener(TickPhase::FixedUpdate, recorder(&log, "fixed"));
        let timer_log = Arc::clone(&log);
        let _ = frames
            .timers
            .create_timer(TimeMode::Scaled, 20, move |_| timer_log.lock().push("timer"), 0, None)
            .unwrap();

        let fired = frames.fixed_update_with(FrameTime::uniform(Duration::from_millis(20)));
        assert_eq!(fired, 1);
        assert_eq!(*log.lock(), vec!["fixed", "timer"]);
        assert_eq!(frames.last_fixed_time().real, Duration::from_millis(20));
    }

    #[test]
    fn test_fixed_update_at_uses_clock() {
        let frames = dispatcher();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _ = frames
            .timers
            .create_timer(TimeMode::Scaled, 30, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }, 0, None)
            .unwrap();

        let start = Instant::now();
        let _ = frames.fixed_update_at(start);
        let _ = frames.fixed_update_at(start + Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        let _ = frames.fixed_update_at(start + Duration::from_millis(40));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_time_scale_zero_pauses_scaled_timers() {
        let frames = dispatcher();
        let scaled = Arc::new(AtomicUsize::new(0));
        let wall = Arc::new(AtomicUsize::new(0));
        let (s, w) = (Arc::clone(&scaled), Arc::clone(&wall));
        let _ = frames
            .timers
            .create_timer(TimeMode::Scaled, 50, move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }, 0, None)
            .unwrap();
        let _ = frames
            .timers
            .create_timer(TimeMode::WallClock, 50, move |_| {
                w.fetch_add(1, Ordering::SeqCst);
            }, 0, None)
            .unwrap();

        assert!(frames.set_time_scale(0.0));
        for _ in 0..5 {
            let time = frames.frame_time(Duration::from_millis(20));
            let _ = frames.fixed_update_with(time);
        }
        assert_eq!(scaled.load(Ordering::SeqCst), 0);
        assert_eq!(wall.load(Ordering::SeqCst), 1);
        assert!(!frames.set_time_scale(-2.0));
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let frames = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _ = frames.add_listener(TickPhase::Update, || panic!("listener boom"));
        let _ = frames.add_listener(TickPhase::Update, recorder(&log, "after"));
        frames.update();
        assert_eq!(*log.lock(), vec!["after"]);
    }
}
