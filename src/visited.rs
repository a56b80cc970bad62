//! Generation-based visited sets and a reuse pool for graph traversal.
//!
//! Marking uses a `u16` generation tag per slot instead of a boolean, so
//! resetting a set between searches is a counter bump rather than a memset
//! (the array is only zeroed when the generation wraps, every 65534 reuses).
//! The pool hands sets out to concurrent searches and takes them back through
//! an RAII handle, so a set is returned on every exit path.

use parking_lot::Mutex;

use crate::idmap::InnerIdType;

/// Generation-tagged visited set. A slot is visited iff it holds the current
/// generation value.
#[derive(Debug)]
pub struct VisitedSet {
    data: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Reset the set. O(1) amortized — full memset only on generation wrap.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Mark `id` as visited. Returns `true` if it was not previously visited.
    #[inline]
    pub fn insert(&mut self, id: InnerIdType) -> bool {
        let slot = &mut self.data[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }

    #[inline]
    pub fn is_visited(&self, id: InnerIdType) -> bool {
        self.data[id as usize] == self.generation
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// Pool of reusable [`VisitedSet`]s, all sized to the index capacity.
///
/// The pool is rebuilt from scratch on capacity growth; handles never outlive
/// the growth because resizes run under the index's global write lock.
#[derive(Debug)]
pub struct VisitedPool {
    capacity: usize,
    free: Mutex<Vec<VisitedSet>>,
}

impl VisitedPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a cleared set out of the pool, allocating one if none is free.
    pub fn acquire(&self) -> VisitedHandle<'_> {
        let set = {
            let mut free = self.free.lock();
            free.pop()
        };
        let set = match set {
            Some(s) => {
                debug_assert_eq!(s.capacity(), self.capacity);
                s
            }
            None => VisitedSet::new(self.capacity),
        };
        VisitedHandle {
            pool: self,
            set: Some(set),
        }
    }
}

/// RAII handle over a pooled [`VisitedSet`]; returns it on drop.
#[derive(Debug)]
pub struct VisitedHandle<'a> {
    pool: &'a VisitedPool,
    set: Option<VisitedSet>,
}

impl VisitedHandle<'_> {
    #[inline]
    pub fn insert(&mut self, id: InnerIdType) -> bool {
        self.set.as_mut().expect("set present until drop").insert(id)
    }

    #[inline]
    pub fn is_visited(&self, id: InnerIdType) -> bool {
        self.set.as_ref().expect("set present until drop").is_visited(id)
    }
}

impl Drop for VisitedHandle<'_> {
    fn drop(&mut self) {
        if let Some(mut set) = self.set.take() {
            set.clear();
            self.pool.free.lock().push(set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_clear() {
        let mut vs = VisitedSet::new(100);
        assert!(vs.insert(0));
        assert!(!vs.insert(0));
        assert!(vs.insert(50));
        assert!(vs.is_visited(50));

        vs.clear();
        assert!(!vs.is_visited(0));
        assert!(vs.insert(0));
        assert!(vs.insert(50));
    }

    #[test]
    fn test_generation_wrap_memsets() {
        let mut vs = VisitedSet::new(10);
        for _ in 0..65534 {
            vs.clear();
        }
        assert_eq!(vs.generation, u16::MAX);
        vs.insert(5);

        vs.clear();
        assert_eq!(vs.generation, 1);
        assert!(vs.insert(5));
    }

    #[test]
    fn test_pool_reuses_sets() {
        let pool = VisitedPool::new(32);
        {
            let mut h = pool.acquire();
            assert!(h.insert(3));
            assert!(!h.insert(3));
        }
        // The returned set comes back cleared.
        let mut h = pool.acquire();
        assert!(!h.is_visited(3));
        assert!(h.insert(3));
        assert_eq!(pool.free.lock().len(), 0);
        drop(h);
        assert_eq!(pool.free.lock().len(), 1);
    }

    #[test]
    fn test_pool_concurrent_handles_are_independent() {
        let pool = VisitedPool::new(16);
        let mut a = pool.acquire();
        let mut b = pool.acquire();
        assert!(a.insert(1));
        assert!(b.insert(1));
        assert!(a.is_visited(1));
        assert!(b.is_visited(1));
    }
}
