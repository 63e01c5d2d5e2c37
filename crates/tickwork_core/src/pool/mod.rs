//! # Object Pool
//!
//! Keyed buckets of idle, reset instances for objects that are created and
//! thrown away every few frames.
//!
//! ## Design Philosophy
//!
//! Buckets are keyed by string (plus an optional namespace), not by type:
//! - One concrete type is often pooled under several names
//!   (`"bullet.red"`, `"bullet.blue"`)
//! - Presentation objects are only known by a runtime template key
//!
//! Two front doors share the same buckets:
//! - **Typed**: [`ObjectPool::acquire`] / [`ObjectPool::release`] for plain
//!   data objects with a default or caller-supplied factory
//! - **Template**: [`ObjectPool::acquire_object`] /
//!   [`ObjectPool::release_object`] for opaque [`PooledObject`]s built from a
//!   registered template
//!
//! Every instance sitting in a bucket has been through [`Poolable::reset`].
//! An acquired instance belongs to the caller until it is released.

mod bucket;
mod object_pool;
mod template;

pub use bucket::{BucketKey, BucketStats};
pub use object_pool::ObjectPool;
pub use template::PooledObject;

/// Capability every pooled object provides: return to a known baseline.
///
/// The pool calls [`reset`](Poolable::reset) on every release, before the
/// instance goes back into its bucket.
///
/// # Example
///
/// ```rust
/// use tickwork_core::Poolable;
///
/// #[derive(Default)]
/// struct Bullet { x: f32, y: f32, alive: bool }
///
/// impl Poolable for Bullet {
///     fn reset(&mut self) {
///         *self = Self::default();
///     }
/// }
/// ```
pub trait Poolable: Send + 'static {
    /// Restores the baseline state.
    fn reset(&mut self);
}
