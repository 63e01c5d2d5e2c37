//! # TICKWORK
//!
//! Host-side integration of the TICKWORK service runtime.
//!
//! ## Crate Structure
//!
//! - `core`: re-export of `tickwork_core` (registry, pool, bus, timers, frames)
//! - [`runtime`]: the [`Runtime`] facade and [`RuntimeError`]
//! - [`host_loop`]: [`HostLoop`], a fixed-step tick source
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use tickwork::{HostLoop, Runtime};
//!
//! let runtime = Runtime::new();
//! runtime.events().subscribe_signal("round.over", || println!("gg")).unwrap();
//!
//! let bus = std::sync::Arc::clone(runtime.events());
//! runtime
//!     .timers()
//!     .create_timer(tickwork::core::TimeMode::Scaled, 200, move |_| {
//!         let _ = bus.publish_signal("round.over");
//!     }, 0, None)
//!     .unwrap();
//!
//! let mut host = HostLoop::new(runtime);
//! host.run_frames(12, Duration::from_millis(20));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use tickwork_core as core;

pub mod host_loop;
pub mod runtime;

pub use host_loop::{FrameStats, FrameStatsAccumulator, HostLoop, SLOW_FRAME_BUDGET};
pub use runtime::{Runtime, RuntimeError, RuntimeResult};
