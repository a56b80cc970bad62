//! Exact f32 codec: raw vectors in a contiguous arena, no compression loss.
//!
//! Used as the high-precision store when reordering is enabled, both for
//! rescoring search candidates and for all construction-time distances.

use std::io::{Read, Write};

use crate::codec::{prefetch_read, QueryComputer, VectorCodec};
use crate::idmap::InnerIdType;
use crate::io;
use crate::params::Metric;

#[derive(Debug)]
pub struct FlatCodec {
    metric: Metric,
    dim: usize,
    /// Raw f32 arena: all vectors contiguous.
    data: Vec<f32>,
}

impl FlatCodec {
    pub fn new(metric: Metric, dim: usize) -> Self {
        Self {
            metric,
            dim,
            data: Vec::new(),
        }
    }

    #[inline]
    fn vector(&self, id: InnerIdType) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }
}

impl VectorCodec for FlatCodec {
    fn train(&mut self, _vectors: &[f32]) {}

    fn batch_insert(&mut self, vectors: &[f32]) {
        debug_assert_eq!(vectors.len() % self.dim, 0);
        self.data.extend_from_slice(vectors);
    }

    fn total_count(&self) -> usize {
        self.data.len() / self.dim
    }

    fn code_size(&self) -> usize {
        self.dim * std::mem::size_of::<f32>()
    }

    fn computer(&self, query: &[f32]) -> QueryComputer {
        QueryComputer::new(query)
    }

    fn query(&self, out: &mut [f32], computer: &QueryComputer, ids: &[InnerIdType]) {
        debug_assert!(out.len() >= ids.len());
        for (i, &id) in ids.iter().enumerate() {
            if i + 1 < ids.len() {
                self.prefetch(ids[i + 1]);
            }
            out[i] = self.metric.distance_f32(&computer.query, self.vector(id));
        }
    }

    fn distance_by_id(&self, a: InnerIdType, b: InnerIdType) -> f32 {
        self.metric.distance_f32(self.vector(a), self.vector(b))
    }

    fn prefetch(&self, id: InnerIdType) {
        let start = id as usize * self.dim;
        if start < self.data.len() {
            let ptr = unsafe { self.data.as_ptr().add(start) as *const u8 };
            prefetch_read(ptr);
            if self.dim > 16 {
                prefetch_read(unsafe { ptr.add(64) });
            }
        }
    }

    fn serialize(&self, w: &mut dyn Write) -> std::io::Result<()> {
        io::write_u64(w, self.dim as u64)?;
        io::write_f32_slice(w, &self.data)
    }

    fn deserialize(&mut self, r: &mut dyn Read) -> std::io::Result<()> {
        let dim = io::read_u64(r)? as usize;
        if dim != self.dim {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("codec dim mismatch: stored {dim}, expected {}", self.dim),
            ));
        }
        self.data = io::read_f32_vec(r)?;
        if self.data.len() % self.dim != 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "flat codec arena not a multiple of dim",
            ));
        }
        Ok(())
    }
}
