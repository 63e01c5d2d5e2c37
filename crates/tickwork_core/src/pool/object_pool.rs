//! # Object Pool Service
//!
//! The pool never runs user code while its lock is held: factories,
//! [`Poolable::reset`] and the destructors of discarded instances all run
//! after the bucket table has been released, so a factory or reset may
//! itself acquire from or release to the pool.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use parking_lot::Mutex;

use super::bucket::{Bucket, BucketKey, BucketStats};
use super::template::{PooledObject, Template};
use super::Poolable;
use crate::error::{PoolError, PoolResult};
use crate::registry::{Service, ServiceRegistry};

#[derive(Default)]
struct PoolInner {
    buckets: HashMap<BucketKey, Bucket>,
    templates: HashMap<String, Template>,
}

/// Keyed pool of reusable instances.
///
/// Obtained from the [`ServiceRegistry`]; there is one pool per registry.
///
/// # Example
///
/// ```rust
/// use tickwork_core::{ObjectPool, Poolable, ServiceRegistry};
///
/// #[derive(Default)]
/// struct Bullet { x: f32 }
///
/// impl Poolable for Bullet {
///     fn reset(&mut self) { self.x = 0.0; }
/// }
///
/// let registry = ServiceRegistry::new();
/// let pool = registry.get::<ObjectPool>();
///
/// let mut bullet: Bullet = pool.acquire("bullet");
/// bullet.x = 12.0;
/// pool.release("bullet", bullet).unwrap();
///
/// let again: Bullet = pool.acquire("bullet");
/// assert_eq!(again.x, 0.0);
/// ```
pub struct ObjectPool {
    inner: Mutex<PoolInner>,
    max_idle: usize,
}

impl Service for ObjectPool {
    fn construct(registry: &ServiceRegistry) -> Self {
        Self::with_max_idle(registry.config().pool.max_idle_per_bucket)
    }
}

impl ObjectPool {
    pub(crate) fn with_max_idle(max_idle: usize) -> Self {
        tracing::debug!(max_idle, "object pool created");
        Self {
            inner: Mutex::new(PoolInner::default()),
            max_idle,
        }
    }

    /// Idle instances a bucket keeps before releases are dropped.
    #[inline]
    #[must_use]
    pub fn max_idle_per_bucket(&self) -> usize {
        self.max_idle
    }

    // =========================================================================
    // Typed front door
    // =========================================================================

    /// Acquires a `T` from the global-scope bucket `key`, default-constructing
    /// one if the bucket is empty.
    #[must_use]
    pub fn acquire<T: Poolable + Default>(&self, key: &str) -> T {
        self.acquire_with(key, "", T::default)
    }

    /// Acquires a `T` from bucket `key` in `namespace`.
    #[must_use]
    pub fn acquire_in<T: Poolable + Default>(&self, key: &str, namespace: &str) -> T {
        self.acquire_with(key, namespace, T::default)
    }

    /// Acquires a `T`, building it with `factory` if the bucket is empty.
    ///
    /// A bucket bound to another type is a configuration error: it is logged
    /// and a fresh instance is built instead, the bucket is left untouched.
    #[must_use]
    pub fn acquire_with<T, F>(&self, key: &str, namespace: &str, factory: F) -> T
    where
        T: Poolable,
        F: FnOnce() -> T,
    {
        match self.take_idle::<T>(&BucketKey::new(key, namespace)) {
            Ok(Some(value)) => value,
            Ok(None) => factory(),
            Err(err) => {
                tracing::warn!(%err, "pool acquire fell back to a fresh instance");
                factory()
            }
        }
    }

    /// Like [`ObjectPool::acquire_in`] but reports a bucket type mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] when the bucket holds another type.
    pub fn try_acquire_in<T: Poolable + Default>(
        &self,
        key: &str,
        namespace: &str,
    ) -> PoolResult<T> {
        Ok(self
            .take_idle::<T>(&BucketKey::new(key, namespace))?
            .unwrap_or_default())
    }

    fn take_idle<T: Poolable>(&self, key: &BucketKey) -> PoolResult<Option<T>> {
        let mut inner = self.inner.lock();
        let bucket = inner
            .buckets
            .entry(key.clone())
            .or_insert_with(Bucket::of::<T>);
        if !bucket.holds(TypeId::of::<T>()) {
            return Err(mismatch::<T>(key, bucket));
        }
        // The bucket is bound to `T`, so the downcast cannot fail.
        Ok(bucket
            .take()
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed))
    }

    /// Resets `instance` and returns it to the global-scope bucket `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] when the bucket holds another type;
    /// the instance is dropped and the bucket is not modified.
    pub fn release<T: Poolable>(&self, key: &str, instance: T) -> PoolResult<()> {
        self.release_in(key, namespace_global(), instance)
    }

    /// Resets `instance` and returns it to bucket `key` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] when the bucket holds another type.
    pub fn release_in<T: Poolable>(
        &self,
        key: &str,
        namespace: &str,
        mut instance: T,
    ) -> PoolResult<()> {
        instance.reset();
        let key = BucketKey::new(key, namespace);
        let (result, rejected) = self.stash(
            &key,
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Box::new(instance),
        );
        drop(rejected);
        if let Err(err) = &result {
            tracing::warn!(%err, "pool release rejected");
        }
        result
    }

    /// Builds `count` instances ahead of time so the first acquires are warm.
    ///
    /// Returns how many instances were actually stored (the idle cap applies).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] when the bucket holds another type.
    pub fn prewarm<T: Poolable + Default>(
        &self,
        key: &str,
        namespace: &str,
        count: usize,
    ) -> PoolResult<usize> {
        let key = BucketKey::new(key, namespace);
        let values: Vec<Box<dyn Any + Send>> = (0..count)
            .map(|_| Box::new(T::default()) as Box<dyn Any + Send>)
            .collect();

        let overflow = {
            let mut inner = self.inner.lock();
            let bucket = inner
                .buckets
                .entry(key.clone())
                .or_insert_with(Bucket::of::<T>);
            if !bucket.holds(TypeId::of::<T>()) {
                return Err(mismatch::<T>(&key, bucket));
            }
            bucket.fill(values, self.max_idle)
        };
        let stored = count - overflow.len();
        drop(overflow);
        tracing::debug!(bucket = %key, stored, "bucket prewarmed");
        Ok(stored)
    }

    // =========================================================================
    // Template front door
    // =========================================================================

    /// Registers how to build and reset the objects pooled under `key`.
    ///
    /// Registering a key twice replaces the template; idle instances built
    /// from the old template stay in the bucket only if the type is unchanged.
    pub fn register_template<T, F>(&self, key: &str, factory: F)
    where
        T: Poolable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let template = Template::new::<T, F>(factory);
        let stale = {
            let mut inner = self.inner.lock();
            let bucket_key = BucketKey::new(key, namespace_global());
            let retyped = inner
                .buckets
                .get(&bucket_key)
                .is_some_and(|bucket| !bucket.holds(template.kind));
            let stale = if retyped {
                inner.buckets.remove(&bucket_key)
            } else {
                None
            };
            inner.templates.insert(key.to_owned(), template);
            stale
        };
        drop(stale);
        tracing::debug!(key, "pool template registered");
    }

    /// Returns `true` if a template is registered under `key`.
    #[must_use]
    pub fn has_template(&self, key: &str) -> bool {
        self.inner.lock().templates.contains_key(key)
    }

    /// Acquires an object built from the template registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::MissingTemplate`] when no template is registered,
    /// or [`PoolError::TypeMismatch`] when typed code has claimed the bucket.
    pub fn acquire_object(&self, key: &str) -> PoolResult<PooledObject> {
        let bucket_key = BucketKey::new(key, namespace_global());
        let (idle, template) = {
            let mut inner = self.inner.lock();
            let Some(template) = inner.templates.get(key).cloned() else {
                tracing::warn!(key, "acquire_object without a template");
                return Err(PoolError::MissingTemplate(key.to_owned()));
            };
            let (kind, kind_name) = (template.kind, template.kind_name);
            let bucket = inner
                .buckets
                .entry(bucket_key.clone())
                .or_insert_with(|| Bucket::new(kind, kind_name));
            if !bucket.holds(kind) {
                return Err(PoolError::TypeMismatch {
                    bucket: bucket_key.to_string(),
                    expected: bucket.kind_name(),
                    found: kind_name,
                });
            }
            (bucket.take(), template)
        };
        let value = idle.unwrap_or_else(|| (template.factory)());
        Ok(PooledObject::new(key, &template, value))
    }

    /// Resets `object` with its template and returns it to its bucket.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::MissingTemplate`] if the template has vanished,
    /// or [`PoolError::TypeMismatch`] when typed code has claimed the bucket
    /// or the key was re-registered with another type since the object was
    /// acquired. A rejected object is dropped, never pooled.
    pub fn release_object(&self, object: PooledObject) -> PoolResult<()> {
        let (kind, kind_name) = object.kind();
        let (key, mut value) = object.into_parts();
        let template = self.inner.lock().templates.get(&key).cloned();
        let Some(template) = template else {
            tracing::warn!(key, "release_object without a template");
            return Err(PoolError::MissingTemplate(key));
        };
        if kind != template.kind {
            tracing::warn!(key, found = kind_name, "released object outlived its template");
            drop(value);
            return Err(PoolError::TypeMismatch {
                bucket: BucketKey::new(&key, namespace_global()).to_string(),
                expected: template.kind_name,
                found: kind_name,
            });
        }
        (template.reset)(value.as_mut());

        let bucket_key = BucketKey::new(&key, namespace_global());
        let (result, rejected) = self.stash(&bucket_key, template.kind, template.kind_name, value);
        drop(rejected);
        result
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    fn stash(
        &self,
        key: &BucketKey,
        kind: TypeId,
        kind_name: &'static str,
        value: Box<dyn Any + Send>,
    ) -> (PoolResult<()>, Option<Box<dyn Any + Send>>) {
        let mut inner = self.inner.lock();
        let bucket = inner
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::new(kind, kind_name));
        if !bucket.holds(kind) {
            let err = PoolError::TypeMismatch {
                bucket: key.to_string(),
                expected: bucket.kind_name(),
                found: kind_name,
            };
            return (Err(err), Some(value));
        }
        (Ok(()), bucket.stash(value, self.max_idle))
    }

    /// Counters for one bucket, `None` if it has never been touched.
    #[must_use]
    pub fn stats(&self, key: &str, namespace: &str) -> Option<BucketStats> {
        self.inner
            .lock()
            .buckets
            .get(&BucketKey::new(key, namespace))
            .map(Bucket::stats)
    }

    /// Idle instances in one bucket.
    #[must_use]
    pub fn idle_count(&self, key: &str, namespace: &str) -> usize {
        self.stats(key, namespace).map_or(0, |stats| stats.idle)
    }

    /// Number of buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Discards the idle contents of one bucket. Returns how many were dropped.
    pub fn clear_bucket(&self, key: &str, namespace: &str) -> usize {
        let drained = {
            let mut inner = self.inner.lock();
            inner
                .buckets
                .get_mut(&BucketKey::new(key, namespace))
                .map(Bucket::drain)
                .unwrap_or_default()
        };
        drained.len()
    }

    /// Drops every bucket and its idle contents. Templates stay registered.
    ///
    /// Nothing is reset and nothing is handed back to a caller.
    pub fn clear_all(&self) {
        let buckets = std::mem::take(&mut self.inner.lock().buckets);
        let discarded: usize = buckets.values().map(|bucket| bucket.stats().idle).sum();
        drop(buckets);
        tracing::debug!(discarded, "object pool cleared");
    }
}

#[inline]
const fn namespace_global() -> &'static str {
    ""
}

fn mismatch<T>(key: &BucketKey, bucket: &Bucket) -> PoolError {
    PoolError::TypeMismatch {
        bucket: key.to_string(),
        expected: bucket.kind_name(),
        found: std::any::type_name::<T>(),
    }
}
