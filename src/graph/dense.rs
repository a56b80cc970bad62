//! Dense bottom-layer adjacency cell.
//!
//! Rows are preallocated up to the index capacity so concurrent insertion
//! never reallocates the table; each row is interior-mutable and owned by the
//! node's stripe lock. Growing the table itself requires `&mut self`, which
//! the index only has under its global write lock.

use std::cell::UnsafeCell;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Result;
use crate::graph::GraphCell;
use crate::idmap::InnerIdType;
use crate::io;

#[derive(Debug)]
pub struct DenseGraphCell {
    max_degree: usize,
    total_count: AtomicU32,
    rows: Vec<UnsafeCell<Vec<InnerIdType>>>,
}

// SAFETY: a row is only touched while the owning node's stripe lock is held
// (shared for `get_neighbors`, unique for `insert_neighbors`), and the `rows`
// vector itself only changes through `&mut self`.
unsafe impl Sync for DenseGraphCell {}

impl DenseGraphCell {
    pub fn new(max_degree: usize) -> Self {
        Self {
            max_degree,
            total_count: AtomicU32::new(0),
            rows: Vec::new(),
        }
    }

    pub fn max_capacity(&self) -> usize {
        self.rows.len()
    }

    /// Grow the row table to `capacity` slots. Never shrinks.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity > self.rows.len() {
            let additional = capacity - self.rows.len();
            self.rows.try_reserve_exact(additional)?;
            self.rows
                .resize_with(capacity, || UnsafeCell::new(Vec::new()));
        }
        Ok(())
    }

    /// Write the cell to a stream. Exclusive access makes the raw row reads
    /// sound without stripe locks.
    pub fn serialize(&mut self, w: &mut dyn Write) -> std::io::Result<()> {
        io::write_u32(w, self.max_degree as u32)?;
        io::write_u64(w, self.total_count() as u64)?;
        io::write_u64(w, self.rows.len() as u64)?;
        for row in &mut self.rows {
            let neighbors = row.get_mut();
            io::write_u32(w, neighbors.len() as u32)?;
            for &n in neighbors.iter() {
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
        let capacity = io::read_len(r, std::mem::size_of::<Vec<InnerIdType>>())?;
        let mut rows = Vec::new();
        rows.try_reserve_exact(capacity)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::OutOfMemory, e.to_string()))?;
        for _ in 0..capacity {
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
            rows.push(UnsafeCell::new(neighbors));
        }
        self.rows = rows;
        self.total_count.store(total as u32, Ordering::Release);
        Ok(())
    }
}

impl GraphCell for DenseGraphCell {
    fn maximum_degree(&self) -> usize {
        self.max_degree
    }

    fn total_count(&self) -> usize {
        self.total_count.load(Ordering::Acquire) as usize
    }

    fn get_neighbors(&self, id: InnerIdType, out: &mut Vec<InnerIdType>) {
        out.clear();
        // SAFETY: caller holds the node's stripe lock (shared or unique).
        let row = unsafe { &*self.rows[id as usize].get() };
        out.extend_from_slice(row);
    }

    fn insert_neighbors(&self, id: InnerIdType, neighbors: Vec<InnerIdType>) {
        debug_assert!(neighbors.len() <= self.max_degree);
        // SAFETY: caller holds the node's stripe lock uniquely.
        let row = unsafe { &mut *self.rows[id as usize].get() };
        *row = neighbors;
    }

    fn increase_total_count(&self, n: u32) {
        self.total_count.fetch_add(n, Ordering::AcqRel);
    }
}
