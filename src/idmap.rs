//! Bidirectional mapping between external labels and dense inner ids.
//!
//! The forward map and the reverse vector live under one reader/writer lock:
//! queries resolve inner ids back to labels while inserts register new pairs.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Result;

/// Externally supplied identifier for a vector.
pub type LabelType = i64;

/// Dense internal node index, stable for the index's lifetime.
pub type InnerIdType = u32;

#[derive(Debug, Default)]
struct IdMapInner {
    lookup: HashMap<LabelType, InnerIdType>,
    /// Indexed by inner id; sized to the index capacity, unused slots hold 0.
    labels: Vec<LabelType>,
}

/// Label ↔ inner-id bijection guarded by a reader/writer lock.
#[derive(Debug, Default)]
pub struct IdMap {
    inner: RwLock<IdMapInner>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered labels.
    pub fn len(&self) -> usize {
        self.inner.read().lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow the reverse vector to the new capacity.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        let mut inner = self.inner.write();
        if capacity > inner.labels.len() {
            let additional = capacity - inner.labels.len();
            inner.labels.try_reserve_exact(additional)?;
            inner.labels.resize(capacity, 0);
        }
        Ok(())
    }

    /// Register a (label, inner id) pair. The caller has already rejected
    /// duplicates; an existing mapping for `label` is a logic error upstream.
    pub fn bind(&self, label: LabelType, inner_id: InnerIdType) {
        let mut inner = self.inner.write();
        inner.lookup.insert(label, inner_id);
        inner.labels[inner_id as usize] = label;
    }

    pub fn contains(&self, label: LabelType) -> bool {
        self.inner.read().lookup.contains_key(&label)
    }

    pub fn inner_of(&self, label: LabelType) -> Option<InnerIdType> {
        self.inner.read().lookup.get(&label).copied()
    }

    pub fn label_of(&self, inner_id: InnerIdType) -> LabelType {
        self.inner.read().labels[inner_id as usize]
    }

    /// Snapshot of the reverse vector (full capacity) for serialization.
    pub fn labels_snapshot(&self) -> Vec<LabelType> {
        self.inner.read().labels.clone()
    }

    /// Snapshot of the forward map for serialization.
    pub fn lookup_snapshot(&self) -> Vec<(LabelType, InnerIdType)> {
        self.inner
            .read()
            .lookup
            .iter()
            .map(|(&l, &id)| (l, id))
            .collect()
    }

    /// Replace the whole mapping from deserialized state.
    pub fn restore(&self, labels: Vec<LabelType>, pairs: Vec<(LabelType, InnerIdType)>) {
        let mut inner = self.inner.write();
        inner.labels = labels;
        inner.lookup = pairs.into_iter().collect();
    }
}
