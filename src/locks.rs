//! Sharded per-node reader/writer locks.
//!
//! A node's adjacency list is guarded by the stripe at `inner_id % stripes`,
//! so lock memory stays O(stripes) instead of O(points). Growing the stripe
//! table requires `&mut self`, which the index only has while holding its
//! global write lock — no guard can be outstanding across a resize.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::idmap::InnerIdType;

/// Upper bound on the stripe count.
pub const MAX_STRIPES: usize = 256;

#[derive(Debug)]
pub struct NodeLocks {
    stripes: Vec<RwLock<()>>,
}

impl NodeLocks {
    pub fn new(capacity: usize) -> Self {
        let mut locks = Self { stripes: Vec::new() };
        locks.resize(capacity);
        locks
    }

    fn stripe_count_for(capacity: usize) -> usize {
        capacity.next_power_of_two().clamp(1, MAX_STRIPES)
    }

    /// Grow the stripe table for the new capacity (never shrinks; capped).
    pub fn resize(&mut self, capacity: usize) {
        let wanted = Self::stripe_count_for(capacity);
        if wanted > self.stripes.len() {
            self.stripes = (0..wanted).map(|_| RwLock::new(())).collect();
        }
    }

    #[inline]
    fn stripe(&self, id: InnerIdType) -> &RwLock<()> {
        // stripe count is a power of two
        &self.stripes[id as usize & (self.stripes.len() - 1)]
    }

    /// Shared hold on the node's stripe, for readers of its neighbor list.
    #[inline]
    pub fn shared(&self, id: InnerIdType) -> RwLockReadGuard<'_, ()> {
        self.stripe(id).read()
    }

    /// Unique hold on the node's stripe, for updating its neighbor list.
    #[inline]
    pub fn unique(&self, id: InnerIdType) -> RwLockWriteGuard<'_, ()> {
        self.stripe(id).write()
    }

    #[cfg(test)]
    fn stripe_len(&self) -> usize {
        self.stripes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_count_grows_and_caps() {
        let mut locks = NodeLocks::new(4);
        assert_eq!(locks.stripe_len(), 4);
        locks.resize(100);
        assert_eq!(locks.stripe_len(), 128);
        locks.resize(1 << 20);
        assert_eq!(locks.stripe_len(), MAX_STRIPES);
    }

    #[test]
    fn test_resize_never_shrinks() {
        let mut locks = NodeLocks::new(256 * 1024);
        assert_eq!(locks.stripe_len(), MAX_STRIPES);
        locks.resize(2);
        assert_eq!(locks.stripe_len(), MAX_STRIPES);
    }

    #[test]
    fn test_shared_holds_coexist() {
        let locks = NodeLocks::new(64);
        let a = locks.shared(1);
        let b = locks.shared(1);
        drop(a);
        drop(b);
        let _w = locks.unique(1);
    }

    #[test]
    fn test_distinct_stripes_do_not_block() {
        let locks = NodeLocks::new(64);
        let _w0 = locks.unique(0);
        // id 1 maps to a different stripe, so this must not deadlock
        let _w1 = locks.unique(1);
    }
}
