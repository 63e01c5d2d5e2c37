//! Template-backed pooling for objects the pool cannot default-construct.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::Poolable;

type ErasedFactory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// How to build and reset one kind of presentation object.
#[derive(Clone)]
pub(crate) struct Template {
    pub(crate) kind: TypeId,
    pub(crate) kind_name: &'static str,
    pub(crate) factory: ErasedFactory,
    pub(crate) reset: fn(&mut (dyn Any + Send)),
}

impl Template {
    pub(crate) fn new<T, F>(factory: F) -> Self
    where
        T: Poolable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            kind: TypeId::of::<T>(),
            kind_name: std::any::type_name::<T>(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Any + Send>),
            reset: reset_erased::<T>,
        }
    }
}

fn reset_erased<T: Poolable>(value: &mut (dyn Any + Send)) {
    if let Some(value) = value.downcast_mut::<T>() {
        value.reset();
    }
}

/// An opaque pooled instance handed out by
/// [`ObjectPool::acquire_object`](super::ObjectPool::acquire_object).
///
/// Not `Clone`: the only way back into the pool is to move it into
/// [`ObjectPool::release_object`](super::ObjectPool::release_object), so the
/// same object cannot be released twice.
pub struct PooledObject {
    key: String,
    kind: TypeId,
    kind_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl PooledObject {
    pub(crate) fn new(key: &str, template: &Template, value: Box<dyn Any + Send>) -> Self {
        Self {
            key: key.to_owned(),
            kind: template.kind,
            kind_name: template.kind_name,
            value,
        }
    }

    /// Concrete type the object was built as.
    pub(crate) fn kind(&self) -> (TypeId, &'static str) {
        (self.kind, self.kind_name)
    }

    pub(crate) fn into_parts(self) -> (String, Box<dyn Any + Send>) {
        (self.key, self.value)
    }

    /// Template key this object was built from.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` if the object is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the object as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutably borrows the object as a `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }
}

impl fmt::Debug for PooledObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject")
            .field("key", &self.key)
            .field("kind", &self.kind_name)
            .finish_non_exhaustive()
    }
}
