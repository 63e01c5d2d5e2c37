//! # Runtime Facade
//!
//! One [`ServiceRegistry`] plus cached handles to the four core services.
//! Hosts create a single `Runtime` at startup and hand out clones of the
//! registry (or of individual services) to their modules.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tickwork_core::{
    ConfigError, EventBus, EventError, FrameDispatcher, ObjectPool, PoolError, Poolable,
    RuntimeConfig, Service, ServiceRegistry, TimeMode, TimerError, TimerId, TimerScheduler,
    TimerSpec,
};

/// Any error a runtime operation can report.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Object pool misuse.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Event bus misuse.
    #[error(transparent)]
    Event(#[from] EventError),
    /// Timer misuse or stale timer id.
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The service runtime.
///
/// # Example
///
/// ```rust
/// use tickwork::Runtime;
///
/// let runtime = Runtime::new();
/// runtime.events().subscribe("hello", |name: &String| println!("hi {name}")).unwrap();
/// runtime.events().publish("hello", &"world".to_string()).unwrap();
/// ```
pub struct Runtime {
    registry: Arc<ServiceRegistry>,
    pool: Arc<ObjectPool>,
    events: Arc<EventBus>,
    timers: Arc<TimerScheduler>,
    frames: Arc<FrameDispatcher>,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(RuntimeConfig::default())
    }

    /// Creates a runtime from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if `config` fails validation.
    pub fn with_config(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Creates a runtime from a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if the file cannot be read, parsed
    /// or validated.
    pub fn from_config_file(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let config = RuntimeConfig::load(path)?;
        Ok(Self::build(config))
    }

    fn build(config: RuntimeConfig) -> Self {
        let registry = Arc::new(ServiceRegistry::with_config(config));
        let runtime = Self {
            pool: registry.get::<ObjectPool>(),
            events: registry.get::<EventBus>(),
            timers: registry.get::<TimerScheduler>(),
            frames: registry.get::<FrameDispatcher>(),
            registry,
        };
        tracing::info!(services = runtime.registry.len(), "runtime started");
        runtime
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// The registry behind this runtime.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        self.registry.config()
    }

    /// Any service, built on first access.
    #[must_use]
    pub fn service<S: Service>(&self) -> Arc<S> {
        self.registry.get::<S>()
    }

    /// The object pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<ObjectPool> {
        &self.pool
    }

    /// The event bus.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The timer scheduler.
    #[inline]
    #[must_use]
    pub fn timers(&self) -> &Arc<TimerScheduler> {
        &self.timers
    }

    /// The frame dispatcher.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> &Arc<FrameDispatcher> {
        &self.frames
    }

    // =========================================================================
    // Delayed recycling
    // =========================================================================

    /// Returns `instance` to bucket `key` in `namespace` after `delay`.
    ///
    /// The release is a one-shot timer; removing the returned timer drops
    /// the instance instead of recycling it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Timer`] if the timer cannot be created.
    pub fn release_after<T: Poolable>(
        &self,
        key: &str,
        namespace: &str,
        instance: T,
        delay: Duration,
        mode: TimeMode,
    ) -> RuntimeResult<TimerId> {
        let pool = Arc::clone(&self.pool);
        let (key, namespace) = (key.to_owned(), namespace.to_owned());
        let slot = Mutex::new(Some(instance));
        let spec = TimerSpec::once(delay).mode(mode).on_complete(move |id| {
            let Some(instance) = slot.lock().take() else {
                return;
            };
            if pool.release_in(&key, &namespace, instance).is_err() {
                tracing::warn!(timer = %id, key = %key, namespace = %namespace, "delayed release dropped its instance");
            }
        });
        Ok(self.timers.create(spec)?)
    }

    // =========================================================================
    // Scene reset
    // =========================================================================

    /// Drops all transient state: every timer, every subscription and every
    /// idle pooled instance. Frame listeners and services stay.
    pub fn reset_scene(&self) {
        let timers = self.timers.clear();
        self.events.clear_all();
        self.pool.clear_all();
        tracing::info!(timers, "scene reset");
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
