//! Per-thread builder reuse.
//!
//! Building a record is allocation-heavy when every put starts from an
//! empty buffer. The pool keeps at most one idle builder per thread and
//! hands it out again on the next checkout. A nested checkout on the same
//! thread (putting a relation target while the owner is still being built)
//! gets a fresh builder, so two live checkouts never share one.

use crate::builder::{FlatBufferBuilder, DEFAULT_BUILDER_CAPACITY};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Builders that grew past this size are dropped instead of retained.
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Counters describing pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Builders allocated because no idle one was available.
    pub created: u64,
    /// Checkouts served by an idle builder.
    pub reused: u64,
    /// Builders dropped on return because they grew too large.
    pub discarded: u64,
}

/// A pool of reusable [`FlatBufferBuilder`]s keyed by thread.
#[derive(Debug)]
pub struct BuilderPool {
    idle: Mutex<HashMap<ThreadId, FlatBufferBuilder>>,
    initial_capacity: usize,
    max_retained_capacity: usize,
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl BuilderPool {
    /// Creates a pool.
    #[must_use]
    pub fn new(initial_capacity: usize, max_retained_capacity: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            initial_capacity,
            max_retained_capacity,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Takes this thread's idle builder, or creates one.
    pub fn checkout(&self) -> PooledBuilder<'_> {
        let owner = thread::current().id();
        let builder = match self.idle.lock().remove(&owner) {
            Some(builder) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                builder
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                FlatBufferBuilder::with_capacity(self.initial_capacity)
            }
        };
        PooledBuilder {
            pool: self,
            owner,
            builder: Some(builder),
        }
    }

    /// Number of idle builders currently retained.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Drops every idle builder.
    pub fn clear(&self) {
        self.idle.lock().clear();
    }

    /// Returns usage counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn give_back(&self, owner: ThreadId, mut builder: FlatBufferBuilder) {
        if builder.capacity() > self.max_retained_capacity {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                capacity = builder.capacity(),
                max = self.max_retained_capacity,
                "dropping oversized builder"
            );
            return;
        }
        builder.reset();
        // an outer checkout may already have returned one; keep the first
        self.idle.lock().entry(owner).or_insert(builder);
    }
}

impl Default for BuilderPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUILDER_CAPACITY, DEFAULT_MAX_RETAINED_CAPACITY)
    }
}

/// A builder on loan from a [`BuilderPool`]; returned on drop.
#[derive(Debug)]
pub struct PooledBuilder<'a> {
    pool: &'a BuilderPool,
    owner: ThreadId,
    builder: Option<FlatBufferBuilder>,
}

impl Deref for PooledBuilder<'_> {
    type Target = FlatBufferBuilder;

    fn deref(&self) -> &FlatBufferBuilder {
        // only taken in drop
        self.builder.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuilder<'_> {
    fn deref_mut(&mut self) -> &mut FlatBufferBuilder {
        self.builder.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuilder<'_> {
    fn drop(&mut self) {
        if let Some(builder) = self.builder.take() {
            self.pool.give_back(self.owner, builder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::property_slot;
    use std::sync::Arc;

    #[test]
    fn builder_is_reused_on_same_thread() {
        let pool = BuilderPool::default();
        {
            let mut builder = pool.checkout();
            builder.collect(1u32, property_slot(1)).unwrap();
        }
        assert_eq!(pool.idle_count(), 1);
        let builder = pool.checkout();
        assert!(builder.is_empty(), "returned builders are reset");
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn nested_checkout_gets_fresh_builder() {
        let pool = BuilderPool::default();
        let mut outer = pool.checkout();
        let name = outer.prepare_string(Some("outer")).unwrap();
        {
            let mut inner = pool.checkout();
            inner.prepare_string(Some("inner")).unwrap();
            inner.collect(2u64, property_slot(1)).unwrap();
            inner.finish().unwrap();
        }
        // outer state untouched by the nested build
        outer.collect_offset(name, property_slot(2)).unwrap();
        let bytes = outer.finish().unwrap();
        let reader = crate::FlatBufferReader::new(&bytes).unwrap();
        assert_eq!(reader.read_string(property_slot(2)).unwrap(), "outer");
        drop(outer);

        assert_eq!(pool.stats().created, 2);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn oversized_builders_are_discarded() {
        let pool = BuilderPool::new(16, 64);
        {
            let mut builder = pool.checkout();
            builder.prepare_bytes(Some(&[0u8; 256])).unwrap();
        }
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn threads_get_their_own_builder() {
        let pool = Arc::new(BuilderPool::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut builder = pool.checkout();
                    builder.collect(7u8, property_slot(1)).unwrap();
                    builder.finish().unwrap().len()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap() > 0);
        }
        assert_eq!(pool.stats().created, 4);
    }
}
