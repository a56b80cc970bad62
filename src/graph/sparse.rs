//! Sparse upper-layer adjacency cell.
//!
//! Route graphs hold a small, level-dependent subset of nodes, so adjacency
//! is a map guarded by its own reader/writer lock rather than a preallocated
//! table. The node-lock stripes still serialize per-node list updates; the
//! map lock only protects the map structure itself.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::graph::GraphCell;
use crate::idmap::InnerIdType;
use crate::io;

#[derive(Debug)]
pub struct SparseGraphCell {
    max_degree: usize,
    total_count: AtomicU32,
    map: RwLock<HashMap<InnerIdType, Vec<InnerIdType>>>,
}

impl SparseGraphCell {
    pub fn new(max_degree: usize) -> Self {
        Self {
            max_degree,
            total_count: AtomicU32::new(0),
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the node is present in this layer.
    pub fn has_node(&self, id: InnerIdType) -> bool {
        self.map.read().contains_key(&id)
    }

    /// Ids present in this layer, ascending.
    pub fn node_ids(&self) -> Vec<InnerIdType> {
        let mut ids: Vec<InnerIdType> = self.map.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn serialize(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let map = self.map.read();
        io::write_u32(w, self.max_degree as u32)?;
        io::write_u64(w, self.total_count() as u64)?;
        io::write_u64(w, map.len() as u64)?;
        let mut ids: Vec<InnerIdType> = map.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let neighbors = &map[&id];
            io::write_u32(w, id)?;
            io::write_u32(w, neighbors.len() as u32)?;
            for &n in neighbors {
                io::write_u32(w, n)?;
            }
        }
        Ok(())
    }

    pub fn deserialize(&mut self, r: &mut dyn Read) -> std::io::Result<()> {
        let max_degree = io::read_u32(r)? as usize;
        if max_degree != self.max_degree {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "graph degree mismatch: stored {max_degree}, expected {}",
                    self.max_degree
                ),
            ));
        }
        let total = io::read_u64(r)?;
        let size = io::read_len(r, 8)?;
        let mut map = HashMap::with_capacity(size);
        for _ in 0..size {
            let id = io::read_u32(r)?;
            let len = io::read_u32(r)? as usize;
            if len > max_degree {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("neighbor list length {len} exceeds degree cap {max_degree}"),
                ));
            }
            let mut neighbors = Vec::with_capacity(len);
            for _ in 0..len {
                neighbors.push(io::read_u32(r)?);
            }
            map.insert(id, neighbors);
        }
        *self.map.get_mut() = map;
        self.total_count.store(total as u32, Ordering::Release);
        Ok(())
    }
}

impl GraphCell for SparseGraphCell {
    fn maximum_degree(&self) -> usize {
        self.max_degree
    }

    fn total_count(&self) -> usize {
        self.total_count.load(Ordering::Acquire) as usize
    }

    fn get_neighbors(&self, id: InnerIdType, out: &mut Vec<InnerIdType>) {
        out.clear();
        if let Some(neighbors) = self.map.read().get(&id) {
            out.extend_from_slice(neighbors);
        }
    }

    fn insert_neighbors(&self, id: InnerIdType, neighbors: Vec<InnerIdType>) {
        debug_assert!(neighbors.len() <= self.max_degree);
        self.map.write().insert(id, neighbors);
    }

    fn increase_total_count(&self, n: u32) {
        self.total_count.fetch_add(n, Ordering::AcqRel);
    }
}
