//! # Service Registry
//!
//! At most one live instance per service type, built on first access.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ServiceRegistry                      │
//! │                                                          │
//! │   slots: TypeId ──> ServiceSlot (per-type mutex)         │
//! │                       ├─ instance: Arc<S>                │
//! │                       └─ binding:  frame listener (tick) │
//! └──────────────────────────────────────────────────────────┘
//!          │ get::<S>()                 │ tick_bound::<S>()
//!          ▼                            ▼
//!   S::construct(&registry)      S::construct + FrameDispatcher::add_listener
//! ```
//!
//! The slot table lock is only held long enough to find or create a slot.
//! Construction runs under the slot's own lock, so two threads racing on
//! the first access of one type build it once, while a constructor is free
//! to fetch *other* services from the registry.
//!
//! A constructor that (directly or indirectly) requests its own type
//! deadlocks. Keep service dependency graphs acyclic.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::frame::{FrameDispatcher, FrameListenerId, TickPhase};

/// A runtime service: built once per registry, shared by `Arc`.
///
/// [`construct`](Service::construct) is the only construction path the
/// services in this crate expose, so nothing can bypass the registry.
pub trait Service: Any + Send + Sync {
    /// Builds the instance. May fetch other services from `registry`.
    fn construct(registry: &ServiceRegistry) -> Self
    where
        Self: Sized;
}

/// A service that receives a tick from the [`FrameDispatcher`].
///
/// Obtain it with [`ServiceRegistry::tick_bound`]; the first access binds
/// [`tick`](TickService::tick) to [`PHASE`](TickService::PHASE), and
/// [`ServiceRegistry::teardown`] unbinds and destroys it.
pub trait TickService: Service {
    /// Phase this service is ticked in.
    const PHASE: TickPhase = TickPhase::Update;

    /// Called once per tick of [`PHASE`](TickService::PHASE).
    fn tick(&self);
}

#[derive(Default)]
struct SlotState {
    /// Holds an `Arc<S>` for the slot's `S`.
    instance: Option<Box<dyn Any + Send + Sync>>,
    binding: Option<(TickPhase, FrameListenerId)>,
    constructions: u64,
}

struct ServiceSlot {
    name: &'static str,
    state: Mutex<SlotState>,
}

/// Type-keyed home of every runtime service.
///
/// Create one at startup and pass it (usually behind an `Arc`) to whatever
/// needs services.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tickwork_core::{EventBus, ServiceRegistry};
///
/// let registry = ServiceRegistry::new();
/// let a = registry.get::<EventBus>();
/// let b = registry.get::<EventBus>();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct ServiceRegistry {
    config: RuntimeConfig,
    slots: Mutex<HashMap<TypeId, Arc<ServiceSlot>>>,
}

impl ServiceRegistry {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a registry whose services read `config` on construction.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration handed to service constructors.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn slot<S: Service>(&self) -> Arc<ServiceSlot> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(TypeId::of::<S>()).or_insert_with(|| {
            Arc::new(ServiceSlot {
                name: std::any::type_name::<S>(),
                state: Mutex::new(SlotState::default()),
            })
        }))
    }

    /// Returns the instance of `S`, building it on first access.
    #[must_use]
    pub fn get<S: Service>(&self) -> Arc<S> {
        let slot = self.slot::<S>();
        let mut state = slot.state.lock();
        if let Some(existing) = current::<S>(&state) {
            return existing;
        }

        let instance = Arc::new(S::construct(self));
        state.instance = Some(Box::new(Arc::clone(&instance)));
        state.constructions += 1;
        tracing::debug!(service = slot.name, "service constructed");
        instance
    }

    /// Returns the instance of a tick-bound service, building it and binding
    /// it to the [`FrameDispatcher`] on first access.
    ///
    /// An instance already built through [`ServiceRegistry::get`] is kept
    /// and bound here. The dispatcher only holds a weak reference; the
    /// registry owns the instance until [`ServiceRegistry::teardown`].
    #[must_use]
    pub fn tick_bound<S: TickService>(&self) -> Arc<S> {
        let slot = self.slot::<S>();
        let mut state = slot.state.lock();
        let instance = match current::<S>(&state) {
            Some(existing) if state.binding.is_some() => return existing,
            Some(existing) => existing,
            None => {
                let instance = Arc::new(S::construct(self));
                state.instance = Some(Box::new(Arc::clone(&instance)));
                state.constructions += 1;
                tracing::debug!(service = slot.name, "service constructed");
                instance
            }
        };

        let weak = Arc::downgrade(&instance);
        let dispatcher = self.get::<FrameDispatcher>();
        let listener = dispatcher.add_listener(S::PHASE, move || {
            if let Some(service) = weak.upgrade() {
                service.tick();
            }
        });
        state.binding = Some((S::PHASE, listener));
        tracing::debug!(service = slot.name, phase = ?S::PHASE, "service bound to tick");
        instance
    }

    /// Destroys a tick-bound service and detaches it from the dispatcher.
    ///
    /// The next [`ServiceRegistry::tick_bound`] builds a fresh instance.
    /// Returns `false` if there was nothing to tear down.
    pub fn teardown<S: TickService>(&self) -> bool {
        let slot = self.slot::<S>();
        let (instance, binding) = {
            let mut state = slot.state.lock();
            (state.instance.take(), state.binding.take())
        };

        if let Some((phase, listener)) = binding {
            let _ = self.get::<FrameDispatcher>().remove_listener(phase, listener);
        }
        let existed = instance.is_some();
        drop(instance);
        if existed {
            tracing::debug!(service = slot.name, "tick-bound service torn down");
        }
        existed
    }

    /// Returns `true` if `S` currently has a live instance.
    #[must_use]
    pub fn contains<S: Service>(&self) -> bool {
        let Some(slot) = self.slots.lock().get(&TypeId::of::<S>()).cloned() else {
            return false;
        };
        let live = slot.state.lock().instance.is_some();
        live
    }

    /// How many times `S` has been constructed by this registry.
    #[must_use]
    pub fn constructions<S: Service>(&self) -> u64 {
        let Some(slot) = self.slots.lock().get(&TypeId::of::<S>()).cloned() else {
            return 0;
        };
        let constructions = slot.state.lock().constructions;
        constructions
    }

    /// Number of live service instances.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<Arc<ServiceSlot>> = self.slots.lock().values().cloned().collect();
        slots
            .iter()
            .filter(|slot| slot.state.lock().instance.is_some())
            .count()
    }

    /// Returns `true` if no service has been built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn current<S: Service>(state: &SlotState) -> Option<Arc<S>> {
    state
        .instance
        .as_ref()
        .and_then(|instance| instance.downcast_ref::<Arc<S>>())
        .map(Arc::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use crate::frame::FrameTime;
    use crate::EventBus;

    static SLOW_BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct SlowService;

    impl Service for SlowService {
        fn construct(_: &ServiceRegistry) -> Self {
            SLOW_BUILDS.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            SlowService
        }
    }

    struct Heartbeat {
        beats: AtomicUsize,
    }

    impl Service for Heartbeat {
        fn construct(_: &ServiceRegistry) -> Self {
            Heartbeat {
                beats: AtomicUsize::new(0),
            }
        }
    }

    impl TickService for Heartbeat {
        fn tick(&self) {
            self.beats.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PhysicsProbe {
        steps: AtomicUsize,
    }

    impl Service for PhysicsProbe {
        fn construct(_: &ServiceRegistry) -> Self {
            PhysicsProbe {
                steps: AtomicUsize::new(0),
            }
        }
    }

    impl TickService for PhysicsProbe {
        const PHASE: TickPhase = TickPhase::FixedUpdate;

        fn tick(&self) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Depends on another service at construction time.
    struct Announcer {
        bus: Arc<EventBus>,
    }

    impl Service for Announcer {
        fn construct(registry: &ServiceRegistry) -> Self {
            Announcer {
                bus: registry.get::<EventBus>(),
            }
        }
    }

    #[test]
    fn test_same_instance_every_time() {
        let registry = ServiceRegistry::new();
        let a = registry.get::<Heartbeat>();
        let b = registry.get::<Heartbeat>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.constructions::<Heartbeat>(), 1);
    }

    #[test]
    fn test_concurrent_first_access_builds_once() {
        let registry = Arc::new(ServiceRegistry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get::<SlowService>()
                })
            })
            .collect();

        let instances: Vec<Arc<SlowService>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(SLOW_BUILDS.load(Ordering::SeqCst), 1);
        assert_eq!(registry.constructions::<SlowService>(), 1);
    }

    #[test]
    fn test_constructor_may_fetch_other_services() {
        let registry = ServiceRegistry::new();
        let announcer = registry.get::<Announcer>();
        assert!(Arc::ptr_eq(&announcer.bus, &registry.get::<EventBus>()));
    }

    #[test]
    fn test_tick_bound_service_receives_ticks() {
        let registry = ServiceRegistry::new();
        let heartbeat = registry.tick_bound::<Heartbeat>();
        let frames = registry.get::<FrameDispatcher>();

        frames.update();
        frames.update();
        assert_eq!(heartbeat.beats.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tick_bound_phase() {
        let registry = ServiceRegistry::new();
        let probe = registry.tick_bound::<PhysicsProbe>();
        let frames = registry.get::<FrameDispatcher>();

        frames.update();
        frames.late_update();
        assert_eq!(probe.steps.load(Ordering::SeqCst), 0);

        let _ = frames.fixed_update_with(FrameTime::uniform(std::time::Duration::from_millis(20)));
        assert_eq!(probe.steps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_bound_binds_instance_built_by_get() {
        let registry = ServiceRegistry::new();
        let plain = registry.get::<Heartbeat>();
        let bound = registry.tick_bound::<Heartbeat>();
        let again = registry.tick_bound::<Heartbeat>();
        let frames = registry.get::<FrameDispatcher>();

        assert!(Arc::ptr_eq(&plain, &bound));
        assert!(Arc::ptr_eq(&bound, &again));
        assert_eq!(registry.constructions::<Heartbeat>(), 1);
        assert_eq!(frames.listener_count(TickPhase::Update), 1);

        frames.update();
        assert_eq!(plain.beats.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_rebuilds_on_next_access() {
        let registry = ServiceRegistry::new();
        let first = registry.tick_bound::<Heartbeat>();
        let frames = registry.get::<FrameDispatcher>();
        assert_eq!(frames.listener_count(TickPhase::Update), 1);

        assert!(registry.teardown::<Heartbeat>());
        assert!(!registry.contains::<Heartbeat>());
        assert_eq!(frames.listener_count(TickPhase::Update), 0);

        frames.update();
        assert_eq!(first.beats.load(Ordering::SeqCst), 0);

        let second = registry.tick_bound::<Heartbeat>();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.constructions::<Heartbeat>(), 2);

        frames.update();
        assert_eq!(second.beats.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_without_instance() {
        let registry = ServiceRegistry::new();
        assert!(!registry.teardown::<Heartbeat>());
    }

    #[test]
    fn test_len_counts_live_services() {
        let registry = ServiceRegistry::new();
        assert!(registry.is_empty());
        let _ = registry.get::<EventBus>();
        let _ = registry.tick_bound::<Heartbeat>();
        // Heartbeat pulls in the dispatcher, which pulls in timers and the pool
        assert!(registry.contains::<FrameDispatcher>());
        assert_eq!(registry.len(), 5);
    }
}
