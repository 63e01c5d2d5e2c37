//! # Event Bus
//!
//! The one sanctioned channel between modules.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  publish("score", &10)  ┌─────────────┐
//! │  Gameplay   │────────────────────────>│             │──> HUD listener
//! └─────────────┘                         │  EventBus   │
//! ┌─────────────┐  publish("score", &25)  │             │──> Audio listener
//! │   Timers    │────────────────────────>│             │
//! └─────────────┘                         └─────────────┘
//! ```
//!
//! Modules never hold each other. They hold the bus, publish under an
//! event identifier, and subscribe to the identifiers they care about.
//!
//! ## Payload typing
//!
//! An event identifier is bound to one payload type by its first
//! subscription and stays bound until it is cleared. Subscribing or
//! publishing with another type is rejected with
//! [`EventError::PayloadMismatch`](crate::EventError::PayloadMismatch).
//! Parameterless events use the `()` payload via
//! [`EventBus::subscribe_signal`] and [`EventBus::publish_signal`].
//!
//! ## Reentrancy
//!
//! Publishing iterates a snapshot of the listener list with no lock held.
//! A listener may subscribe, unsubscribe or publish from inside its
//! callback:
//! - new listeners take effect from the next publish
//! - removed listeners that the snapshot has not reached yet are skipped
//! - a listener that panics is logged and skipped, the rest still run

mod bus;

pub use bus::{EventBus, ListenerId};
