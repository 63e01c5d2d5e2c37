//! Bucket storage shared by the typed and template front doors.

use std::any::{Any, TypeId};
use std::fmt;

/// Identifies one bucket: a name, optionally scoped by a namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    namespace: String,
    name: String,
}

impl BucketKey {
    /// Creates a key. An empty namespace is the global scope.
    #[must_use]
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }

    /// Bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace, empty for the global scope.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Per-bucket counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Instances built because the bucket was empty (or prewarmed).
    pub created: u64,
    /// Acquires served from the bucket.
    pub reused: u64,
    /// Instances returned to the bucket.
    pub released: u64,
    /// Releases discarded because the bucket was at its idle cap.
    pub dropped: u64,
    /// Instances currently idle in the bucket.
    pub idle: usize,
}

/// Idle instances of one concrete type.
pub(crate) struct Bucket {
    kind: TypeId,
    kind_name: &'static str,
    /// LIFO: the most recently released (warmest) instance goes out first.
    idle: Vec<Box<dyn Any + Send>>,
    stats: BucketStats,
}

impl Bucket {
    pub(crate) fn new(kind: TypeId, kind_name: &'static str) -> Self {
        Self {
            kind,
            kind_name,
            idle: Vec::new(),
            stats: BucketStats::default(),
        }
    }

    pub(crate) fn of<T: Any>() -> Self {
        Self::new(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    #[inline]
    pub(crate) fn holds(&self, kind: TypeId) -> bool {
        self.kind == kind
    }

    #[inline]
    pub(crate) fn kind_name(&self) -> &'static str {
        self.kind_name
    }

    /// Pops an idle instance, counting a reuse, or counts a creation.
    pub(crate) fn take(&mut self) -> Option<Box<dyn Any + Send>> {
        let value = self.idle.pop();
        if value.is_some() {
            self.stats.reused += 1;
        } else {
            self.stats.created += 1;
        }
        value
    }

    /// Stores a reset instance, or hands it back when the bucket is full.
    pub(crate) fn stash(
        &mut self,
        value: Box<dyn Any + Send>,
        max_idle: usize,
    ) -> Option<Box<dyn Any + Send>> {
        if self.idle.len() >= max_idle {
            self.stats.dropped += 1;
            return Some(value);
        }
        self.idle.push(value);
        self.stats.released += 1;
        None
    }

    /// Adds freshly built instances up to the idle cap, returning overflow.
    pub(crate) fn fill(
        &mut self,
        values: Vec<Box<dyn Any + Send>>,
        max_idle: usize,
    ) -> Vec<Box<dyn Any + Send>> {
        let room = max_idle.saturating_sub(self.idle.len());
        let mut values = values;
        let overflow = if values.len() > room {
            values.split_off(room)
        } else {
            Vec::new()
        };
        self.stats.created += values.len() as u64;
        self.idle.extend(values);
        overflow
    }

    pub(crate) fn drain(&mut self) -> Vec<Box<dyn Any + Send>> {
        std::mem::take(&mut self.idle)
    }

    pub(crate) fn stats(&self) -> BucketStats {
        BucketStats {
            idle: self.idle.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(BucketKey::new("bullet", "").to_string(), "bullet");
        assert_eq!(BucketKey::new("bullet", "arena").to_string(), "arena/bullet");
    }

    #[test]
    fn test_namespaces_are_distinct() {
        assert_ne!(BucketKey::new("bullet", ""), BucketKey::new("bullet", "arena"));
    }

    #[test]
    fn test_stash_respects_cap() {
        let mut bucket = Bucket::of::<u32>();
        assert!(bucket.stash(Box::new(1_u32), 1).is_none());
        let rejected = bucket.stash(Box::new(2_u32), 1).unwrap();
        assert_eq!(*rejected.downcast::<u32>().unwrap(), 2);

        let stats = bucket.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_take_is_lifo() {
        let mut bucket = Bucket::of::<u32>();
        let _ = bucket.stash(Box::new(1_u32), 8);
        let _ = bucket.stash(Box::new(2_u32), 8);
        let top = bucket.take().unwrap();
        assert_eq!(*top.downcast::<u32>().unwrap(), 2);
        assert_eq!(bucket.stats().reused, 1);
    }

    #[test]
    fn test_fill_returns_overflow() {
        let mut bucket = Bucket::of::<u32>();
        let values: Vec<Box<dyn Any + Send>> = (0..5_u32)
            .map(|v| Box::new(v) as Box<dyn Any + Send>)
            .collect();
        let overflow = bucket.fill(values, 3);
        assert_eq!(overflow.len(), 2);
        assert_eq!(bucket.stats().idle, 3);
        assert_eq!(bucket.stats().created, 3);
    }
}
