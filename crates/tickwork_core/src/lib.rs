//! # TICKWORK Core
//!
//! A small service runtime for hosts that tick once per frame:
//! - one lazily built instance per service type ([`ServiceRegistry`])
//! - keyed recycling of short-lived objects ([`ObjectPool`])
//! - typed publish/subscribe, the only channel between modules ([`EventBus`])
//! - delayed and repeating callbacks on a shared clock ([`TimerScheduler`])
//! - the per-frame fan-out that drives it all ([`FrameDispatcher`])
//!
//! ## Architecture
//!
//! ```text
//!  host tick ──> FrameDispatcher ──> Update / FixedUpdate / LateUpdate listeners
//!                      │
//!                      └──> TimerScheduler::advance ──> due callbacks
//!                                                            │
//!  module A ──publish──> EventBus ──deliver──> module B <────┘ (typically)
//! ```
//!
//! Every service is `Send + Sync`, owned by the registry behind an `Arc`,
//! and guards its state with a `parking_lot::Mutex` that is never held
//! while user code runs. Callbacks may therefore subscribe, unsubscribe,
//! create or remove timers, and return objects to the pool they came from.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use tickwork_core::{EventBus, FrameDispatcher, FrameTime, ServiceRegistry, TimeMode, TimerScheduler};
//!
//! let registry = ServiceRegistry::new();
//! let bus = registry.get::<EventBus>();
//! let timers = registry.get::<TimerScheduler>();
//! let frames = registry.get::<FrameDispatcher>();
//!
//! bus.subscribe("wave.start", |wave: &u32| println!("wave {wave}")).unwrap();
//!
//! let announcer = registry.get::<EventBus>();
//! timers
//!     .create_timer(TimeMode::Scaled, 1_000, move |_| {
//!         let _ = announcer.publish("wave.start", &2_u32);
//!     }, 0, None)
//!     .unwrap();
//!
//! for _ in 0..50 {
//!     frames.fixed_update_with(FrameTime::uniform(Duration::from_millis(20)));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod pool;
pub mod registry;
pub mod timer;

pub use config::{FrameConfig, PoolConfig, RuntimeConfig, TimerConfig};
pub use error::{
    ConfigError, ConfigResult, EventError, EventResult, PoolError, PoolResult, TimerError,
    TimerResult,
};
pub use events::{EventBus, ListenerId};
pub use frame::{FrameClock, FrameDispatcher, FrameListenerId, FrameTime, TickPhase};
pub use pool::{BucketKey, BucketStats, ObjectPool, Poolable, PooledObject};
pub use registry::{Service, ServiceRegistry, TickService};
pub use timer::{TimeMode, TimerCallback, TimerId, TimerScheduler, TimerSpec};
