//! Scalar-quantized codec: f32 → u8 with per-vector min/scale calibration.
//!
//! Codes live in a contiguous arena (one byte per dimension per point) with
//! parallel min/scale arrays, so a stored code is an O(1) slice. Distances
//! against a query keep the query at full f32 precision (asymmetric
//! computation); distances between two stored codes dequantize one side.

use std::io::{Read, Write};

use crate::codec::{prefetch_read, QueryComputer, VectorCodec};
use crate::idmap::InnerIdType;
use crate::io;
use crate::params::Metric;

#[derive(Debug)]
pub struct ScalarCodec {
    metric: Metric,
    dim: usize,
    /// Quantized arena: all code bytes contiguous.
    data: Vec<u8>,
    mins: Vec<f32>,
    scales: Vec<f32>,
}

impl ScalarCodec {
    pub fn new(metric: Metric, dim: usize) -> Self {
        Self {
            metric,
            dim,
            data: Vec::new(),
            mins: Vec::new(),
            scales: Vec::new(),
        }
    }

    /// Quantize one vector into the arena.
    fn push_vector(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dim);
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &v in vector {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }

        let range = max - min;
        if range < f32::EPSILON {
            self.data.extend(std::iter::repeat(128u8).take(self.dim));
            self.mins.push(min);
            self.scales.push(0.0);
        } else {
            let inv_scale = 255.0 / range;
            self.data.extend(
                vector
                    .iter()
                    .map(|&v| ((v - min) * inv_scale).round().clamp(0.0, 255.0) as u8),
            );
            self.mins.push(min);
            self.scales.push(range / 255.0);
        }
    }

    #[inline]
    fn code(&self, id: InnerIdType) -> &[u8] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Dequantize a stored code into the provided buffer (no allocation).
    fn dequantize_into(&self, id: InnerIdType, buf: &mut [f32]) {
        let min = self.mins[id as usize];
        let scale = self.scales[id as usize];
        for (dst, &byte) in buf.iter_mut().zip(self.code(id)) {
            *dst = min + byte as f32 * scale;
        }
    }
}

impl VectorCodec for ScalarCodec {
    fn train(&mut self, _vectors: &[f32]) {
        // calibration is per vector, nothing to learn from a batch
    }

    fn batch_insert(&mut self, vectors: &[f32]) {
        debug_assert_eq!(vectors.len() % self.dim, 0);
        for chunk in vectors.chunks_exact(self.dim) {
            self.push_vector(chunk);
        }
    }

    fn total_count(&self) -> usize {
        self.mins.len()
    }

    fn code_size(&self) -> usize {
        self.dim + 2 * std::mem::size_of::<f32>()
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
            out[i] = self.metric.distance_asym(
                &computer.query,
                self.code(id),
                self.mins[id as usize],
                self.scales[id as usize],
                computer.norm_sq,
            );
        }
    }

    fn distance_by_id(&self, a: InnerIdType, b: InnerIdType) -> f32 {
        let mut buf = vec![0.0f32; self.dim];
        self.dequantize_into(a, &mut buf);
        let norm_sq = buf.iter().map(|&x| x * x).sum();
        self.metric.distance_asym(
            &buf,
            self.code(b),
            self.mins[b as usize],
            self.scales[b as usize],
            norm_sq,
        )
    }

    fn prefetch(&self, id: InnerIdType) {
        let start = id as usize * self.dim;
        if start < self.data.len() {
            let ptr = unsafe { self.data.as_ptr().add(start) };
            prefetch_read(ptr);
            if self.dim > 64 {
                prefetch_read(unsafe { ptr.add(64) });
            }
        }
    }

    fn serialize(&self, w: &mut dyn Write) -> std::io::Result<()> {
        io::write_u64(w, self.dim as u64)?;
        io::write_bytes(w, &self.data)?;
        io::write_f32_slice(w, &self.mins)?;
        io::write_f32_slice(w, &self.scales)
    }

    fn deserialize(&mut self, r: &mut dyn Read) -> std::io::Result<()> {
        let dim = io::read_u64(r)? as usize;
        if dim != self.dim {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("codec dim mismatch: stored {dim}, expected {}", self.dim),
            ));
        }
        self.data = io::read_bytes(r)?;
        self.mins = io::read_f32_vec(r)?;
        self.scales = io::read_f32_vec(r)?;
        if self.data.len() != self.mins.len() * self.dim || self.mins.len() != self.scales.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "inconsistent scalar codec arenas",
            ));
        }
        Ok(())
    }
}
