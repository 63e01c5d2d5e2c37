//! Listener tables and dispatch.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{EventError, EventResult};
use crate::registry::{Service, ServiceRegistry};

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

type Handler = Box<dyn Fn(&dyn Any) + Send + Sync>;

struct Registration {
    id: ListenerId,
    once: bool,
    /// Cleared on removal; a dispatch snapshot checks it before every call.
    active: AtomicBool,
    handler: Handler,
}

struct Channel {
    payload: TypeId,
    payload_name: &'static str,
    listeners: Vec<Arc<Registration>>,
}

impl Channel {
    fn of<T: Any>() -> Self {
        Self {
            payload: TypeId::of::<T>(),
            payload_name: std::any::type_name::<T>(),
            listeners: Vec::new(),
        }
    }

    fn mismatch<T: Any>(&self, event: &str) -> EventError {
        EventError::PayloadMismatch {
            event: event.to_owned(),
            expected: self.payload_name,
            found: std::any::type_name::<T>(),
        }
    }

    fn deactivate_all(&self) {
        for registration in &self.listeners {
            registration.active.store(false, Ordering::Release);
        }
    }
}

/// Typed publish/subscribe bus keyed by event identifier.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use tickwork_core::{EventBus, ServiceRegistry};
///
/// let registry = ServiceRegistry::new();
/// let bus = registry.get::<EventBus>();
///
/// let total = Arc::new(AtomicU32::new(0));
/// let sink = Arc::clone(&total);
/// bus.subscribe("score", move |points: &u32| {
///     sink.fetch_add(*points, Ordering::SeqCst);
/// })
/// .unwrap();
///
/// assert_eq!(bus.publish("score", &10_u32), Ok(1));
/// assert_eq!(total.load(Ordering::SeqCst), 10);
/// ```
pub struct EventBus {
    channels: Mutex<HashMap<String, Channel>>,
    next_id: AtomicU64,
}

impl Service for EventBus {
    fn construct(_: &ServiceRegistry) -> Self {
        tracing::debug!("event bus created");
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl EventBus {
    /// Subscribes `callback` to `event`, whose payload is a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::PayloadMismatch`] if `event` is bound to
    /// another payload type.
    pub fn subscribe<T, F>(&self, event: &str, callback: F) -> EventResult<ListenerId>
    where
        T: Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register::<T, F>(event, false, callback)
    }

    /// Subscribes `callback` for a single delivery; it is removed before it
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::PayloadMismatch`] if `event` is bound to
    /// another payload type.
    pub fn subscribe_once<T, F>(&self, event: &str, callback: F) -> EventResult<ListenerId>
    where
        T: Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register::<T, F>(event, true, callback)
    }

    /// Subscribes a parameterless `callback` to `event`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::PayloadMismatch`] if `event` carries a payload.
    pub fn subscribe_signal<F>(&self, event: &str, callback: F) -> EventResult<ListenerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register::<(), _>(event, false, move |_: &()| callback())
    }

    fn register<T, F>(&self, event: &str, once: bool, callback: F) -> EventResult<ListenerId>
    where
        T: Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            once,
            active: AtomicBool::new(true),
            handler: Box::new(move |payload: &dyn Any| {
                if let Some(payload) = payload.downcast_ref::<T>() {
                    callback(payload);
                }
            }),
        });

        let mut channels = self.channels.lock();
        let channel = channels
            .entry(event.to_owned())
            .or_insert_with(Channel::of::<T>);
        if channel.payload != TypeId::of::<T>() {
            let err = channel.mismatch::<T>(event);
            drop(channels);
            tracing::warn!(%err, "subscribe rejected");
            return Err(err);
        }
        channel.listeners.push(registration);
        Ok(id)
    }

    /// Removes a listener. Safe to call from inside a dispatch, including
    /// from the listener itself.
    ///
    /// Returns `false` if the listener was already gone.
    pub fn unsubscribe(&self, event: &str, id: ListenerId) -> bool {
        let removed = {
            let mut channels = self.channels.lock();
            channels.get_mut(event).and_then(|channel| {
                let index = channel.listeners.iter().position(|r| r.id == id)?;
                Some(channel.listeners.remove(index))
            })
        };
        match removed {
            Some(registration) => {
                registration.active.store(false, Ordering::Release);
                true
            }
            None => {
                tracing::debug!(event, %id, "unsubscribe of unknown listener");
                false
            }
        }
    }

    /// Delivers `payload` to every listener of `event`.
    ///
    /// Returns how many listeners ran to completion. No listeners is `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::PayloadMismatch`] if `event` is bound to
    /// another payload type; nothing is delivered.
    pub fn publish<T: Any>(&self, event: &str, payload: &T) -> EventResult<usize> {
        let snapshot = {
            let channels = self.channels.lock();
            let Some(channel) = channels.get(event) else {
                return Ok(0);
            };
            if channel.payload != TypeId::of::<T>() {
                let err = channel.mismatch::<T>(event);
                drop(channels);
                tracing::warn!(%err, "publish rejected");
                return Err(err);
            }
            channel.listeners.clone()
        };

        let payload: &dyn Any = payload;
        let mut delivered = 0;
        for registration in &snapshot {
            if registration.once {
                if !registration.active.swap(false, Ordering::AcqRel) {
                    continue;
                }
                self.forget(event, registration.id);
            } else if !registration.active.load(Ordering::Acquire) {
                continue;
            }

            let handler = &registration.handler;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(event, id = %registration.id, "listener panicked, delivery continues");
                }
            }
        }
        Ok(delivered)
    }

    /// Delivers a parameterless event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::PayloadMismatch`] if `event` carries a payload.
    pub fn publish_signal(&self, event: &str) -> EventResult<usize> {
        self.publish(event, &())
    }

    fn forget(&self, event: &str, id: ListenerId) {
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get_mut(event) {
            channel.listeners.retain(|r| r.id != id);
        }
    }

    /// Removes every listener of `event` and unbinds its payload type.
    ///
    /// Returns how many listeners were removed.
    pub fn clear_for(&self, event: &str) -> usize {
        let channel = self.channels.lock().remove(event);
        channel.map_or(0, |channel| {
            channel.deactivate_all();
            channel.listeners.len()
        })
    }

    /// Removes every listener of every event.
    pub fn clear_all(&self) {
        let channels = std::mem::take(&mut *self.channels.lock());
        let removed: usize = channels
            .values()
            .map(|channel| {
                channel.deactivate_all();
                channel.listeners.len()
            })
            .sum();
        tracing::debug!(events = channels.len(), removed, "event bus cleared");
    }

    /// Listeners currently subscribed to `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.channels
            .lock()
            .get(event)
            .map_or(0, |channel| channel.listeners.len())
    }

    /// Returns `true` if `event` has at least one listener.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }
}
