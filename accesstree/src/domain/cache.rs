//! Bounded in-process cache of scope nodes.
//!
//! Two lookup indexes over one node set: by id and by
//! `(level, instance)`. Entries are immutable `Arc` snapshots; a path
//! change must re-`put` or [`reset_all`](ContextCache::reset_all),
//! never mutate in place, because the same `Arc` may be held by live
//! permission snapshots.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use accesstree_sdk::models::{ContextLevel, ContextNode};

/// Fraction of the capacity dropped in one eviction pass.
const EVICT_DIVISOR: usize = 3;

#[derive(Default)]
struct CacheInner {
    by_id: HashMap<i64, Arc<ContextNode>>,
    by_instance: HashMap<(ContextLevel, i64), i64>,
    /// Insertion order; may contain ids already removed (skipped lazily
    /// during eviction).
    order: VecDeque<i64>,
}

/// Bounded dual-index cache with bulk oldest-first eviction.
///
/// When an insert pushes the size past the capacity, roughly one third
/// of the entries are evicted at once, amortizing the eviction cost
/// across many insertions instead of paying it on every put.
pub struct ContextCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ContextCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<Arc<ContextNode>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    #[must_use]
    pub fn get_by_instance(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Option<Arc<ContextNode>> {
        let inner = self.inner.lock();
        let id = inner.by_instance.get(&(level, instance_id))?;
        inner.by_id.get(id).cloned()
    }

    /// Insert or replace a node; returns the shared handle.
    pub fn put(&self, node: ContextNode) -> Arc<ContextNode> {
        let node = Arc::new(node);
        let mut inner = self.inner.lock();
        let replaced = inner
            .by_id
            .insert(node.id, Arc::clone(&node))
            .is_some();
        inner.by_instance.insert((node.level, node.instance_id), node.id);
        if !replaced {
            inner.order.push_back(node.id);
            if inner.by_id.len() > self.capacity {
                Self::evict(&mut inner, self.capacity / EVICT_DIVISOR);
            }
        }
        node
    }

    pub fn remove(&self, id: i64) {
        let mut inner = self.inner.lock();
        if let Some(node) = inner.by_id.remove(&id) {
            inner.by_instance.remove(&(node.level, node.instance_id));
        }
    }

    pub fn remove_many(&self, ids: &[i64]) {
        let mut inner = self.inner.lock();
        for id in ids {
            if let Some(node) = inner.by_id.remove(id) {
                inner.by_instance.remove(&(node.level, node.instance_id));
            }
        }
    }

    /// Drop everything. Called on logout, catalog changes, bulk tree
    /// mutations and test resets.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock();
        inner.by_id.clear();
        inner.by_instance.clear();
        inner.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_id.is_empty()
    }

    fn evict(inner: &mut CacheInner, count: usize) {
        let mut evicted = 0;
        while evicted < count {
            let Some(id) = inner.order.pop_front() else {
                break;
            };
            // Stale order entries (removed or re-inserted ids) don't count.
            if let Some(node) = inner.by_id.remove(&id) {
                inner.by_instance.remove(&(node.level, node.instance_id));
                evicted += 1;
            }
        }
    }
}
