//! Distance kernels.
//!
//! Exact f32-vs-f32 kernels for the precise codec and asymmetric
//! f32-query-vs-u8-stored kernels for the scalar-quantized codec. Inner loops
//! run over fixed-size chunks with f32 accumulators so the compiler can
//! auto-vectorize; chunk sums are folded into f64 to limit rounding drift.

use crate::params::Metric;

/// 8 × f32 = 256 bit = one AVX register.
const CHUNK_F32: usize = 8;

pub fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            acc += a[base + j] * b[base + j];
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        sum += (a[i] * b[i]) as f64;
    }
    sum as f32
}

pub fn l2_sq_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            let d = a[base + j] - b[base + j];
            acc += d * d;
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let d = (a[i] - b[i]) as f64;
        sum += d * d;
    }
    sum as f32
}

pub fn cosine_sim_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut cd = 0.0f32;
        let mut cna = 0.0f32;
        let mut cnb = 0.0f32;
        for j in 0..CHUNK_F32 {
            let x = a[base + j];
            let y = b[base + j];
            cd += x * y;
            cna += x * x;
            cnb += y * y;
        }
        dot += cd as f64;
        norm_a += cna as f64;
        norm_b += cnb as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let x = a[i] as f64;
        let y = b[i] as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Asymmetric dot product: f32 query vs u8 stored with min/scale calibration.
pub fn dot_asym(query: &[f32], code: &[u8], min: f32, scale: f32) -> f32 {
    debug_assert_eq!(query.len(), code.len());
    let len = query.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            let s = min + code[base + j] as f32 * scale;
            acc += query[base + j] * s;
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let s = min as f64 + code[i] as f64 * scale as f64;
        sum += query[i] as f64 * s;
    }
    sum as f32
}

/// Asymmetric squared Euclidean distance: f32 query vs u8 stored.
pub fn l2_sq_asym(query: &[f32], code: &[u8], min: f32, scale: f32) -> f32 {
    debug_assert_eq!(query.len(), code.len());
    let len = query.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            let s = min + code[base + j] as f32 * scale;
            let d = query[base + j] - s;
            acc += d * d;
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let s = min as f64 + code[i] as f64 * scale as f64;
        let d = query[i] as f64 - s;
        sum += d * d;
    }
    sum as f32
}

/// Asymmetric cosine similarity with a precomputed query norm squared.
pub fn cosine_sim_asym_prenorm(
    query: &[f32],
    code: &[u8],
    min: f32,
    scale: f32,
    query_norm_sq: f32,
) -> f32 {
    debug_assert_eq!(query.len(), code.len());
    if query_norm_sq < 1e-10 {
        return 0.0;
    }
    let len = query.len();
    let mut dot = 0.0f64;
    let mut norm_s = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut cd = 0.0f32;
        let mut cns = 0.0f32;
        for j in 0..CHUNK_F32 {
            let s = min + code[base + j] as f32 * scale;
            cd += query[base + j] * s;
            cns += s * s;
        }
        dot += cd as f64;
        norm_s += cns as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let s = min as f64 + code[i] as f64 * scale as f64;
        dot += query[i] as f64 * s;
        norm_s += s * s;
    }

    let denom = (query_norm_sq as f64).sqrt() * norm_s.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

impl Metric {
    /// Exact f32-vs-f32 distance. Lower is more similar for every metric.
    pub(crate) fn distance_f32(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => l2_sq_f32(a, b),
            Metric::InnerProduct => 1.0 - dot_f32(a, b),
            Metric::Cosine => 1.0 - cosine_sim_f32(a, b),
        }
    }

    /// Asymmetric f32-query-vs-u8-stored distance with precomputed query norm.
    pub(crate) fn distance_asym(
        self,
        query: &[f32],
        code: &[u8],
        min: f32,
        scale: f32,
        query_norm_sq: f32,
    ) -> f32 {
        match self {
            Metric::L2 => l2_sq_asym(query, code, min, scale),
            Metric::InnerProduct => 1.0 - dot_asym(query, code, min, scale),
            Metric::Cosine => {
                1.0 - cosine_sim_asym_prenorm(query, code, min, scale, query_norm_sq)
            }
        }
    }
}
