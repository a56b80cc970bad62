//! Index and search parameters.
//!
//! Both parameter sets are plain serde structs so callers can hand them over
//! as JSON strings (`HGraphParams::from_json`, `SearchParams::from_json`) or
//! construct them directly. Every knob has a default.

use serde::{Deserialize, Serialize};

use crate::error::{HGraphError, Result};

/// Default number of bidirectional links per node in the bottom graph.
pub const DEFAULT_MAX_DEGREE: usize = 32;

/// Default candidate list size during construction.
pub const DEFAULT_EF_CONSTRUCTION: usize = 400;

/// Default candidate list size during search.
pub const DEFAULT_EF_SEARCH: usize = 60;

/// Default worker count for batched insertion. 1 = single-threaded build.
pub const DEFAULT_BUILD_THREAD_COUNT: usize = 1;

/// Default seed for the level generator.
pub const DEFAULT_RANDOM_SEED: u64 = 100;

/// Capacity is rounded up to multiples of `1 << RESIZE_BIT` slots.
pub const RESIZE_BIT: u64 = 10;

/// Default block granularity for [`crate::HGraph::estimate_memory`].
pub const DEFAULT_BLOCK_SIZE_LIMIT: usize = 128 * 1024 * 1024;

/// Distance metric used for vector similarity.
///
/// All metrics return a value where lower means more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance.
    L2,
    /// `1 - dot(a, b)`.
    #[serde(rename = "ip")]
    InnerProduct,
    /// `1 - cos(a, b)`.
    Cosine,
}

impl Metric {
    /// Stable wire tag used by the serialized index header.
    pub fn to_u32(self) -> u32 {
        match self {
            Metric::L2 => 0,
            Metric::InnerProduct => 1,
            Metric::Cosine => 2,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self> {
        match v {
            0 => Ok(Metric::L2),
            1 => Ok(Metric::InnerProduct),
            2 => Ok(Metric::Cosine),
            other => Err(HGraphError::ReadError(format!(
                "unknown metric tag: {other}"
            ))),
        }
    }
}

/// Construction-time parameters for an [`crate::HGraph`] index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HGraphParams {
    /// Distance metric.
    pub metric: Metric,
    /// Vector dimensionality. Must be set to a positive value.
    pub dim: usize,
    /// Neighbor cap of the bottom graph; upper layers use half of it.
    pub max_degree: usize,
    /// Beam width used while connecting a new point.
    pub ef_construction: usize,
    /// Worker threads for batched insertion.
    pub build_thread_count: usize,
    /// Store an additional exact f32 codec and rescore candidates with it.
    pub use_reorder: bool,
    /// Bytes of opaque per-point payload returned with search results.
    /// 0 disables the extra-info store.
    pub extra_info_size: usize,
    /// Seed for the level generator.
    pub random_seed: u64,
}

impl Default for HGraphParams {
    fn default() -> Self {
        Self {
            metric: Metric::L2,
            dim: 0,
            max_degree: DEFAULT_MAX_DEGREE,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            build_thread_count: DEFAULT_BUILD_THREAD_COUNT,
            use_reorder: false,
            extra_info_size: 0,
            random_seed: DEFAULT_RANDOM_SEED,
        }
    }
}

impl HGraphParams {
    /// Parse parameters from a JSON string.
    ///
    /// Unknown keys are rejected; missing keys fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| HGraphError::InvalidArgument(format!("bad index parameters: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(HGraphError::InvalidArgument(
                "dim must be greater than 0".into(),
            ));
        }
        if self.max_degree < 2 {
            return Err(HGraphError::InvalidArgument(format!(
                "max_degree({}) must be at least 2",
                self.max_degree
            )));
        }
        if self.ef_construction == 0 {
            return Err(HGraphError::InvalidArgument(
                "ef_construction must be greater than 0".into(),
            ));
        }
        if self.build_thread_count == 0 {
            return Err(HGraphError::InvalidArgument(
                "build_thread_count must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Per-query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchParams {
    /// Beam width of the bottom-layer search. Clamped up to `k` internally.
    pub ef_search: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            ef_search: DEFAULT_EF_SEARCH,
        }
    }
}

impl SearchParams {
    /// Parse search parameters from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| HGraphError::InvalidArgument(format!("bad search parameters: {e}")))?;
        if params.ef_search == 0 {
            return Err(HGraphError::InvalidArgument(
                "ef_search must be greater than 0".into(),
            ));
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = HGraphParams::default();
        assert_eq!(p.max_degree, DEFAULT_MAX_DEGREE);
        assert_eq!(p.ef_construction, DEFAULT_EF_CONSTRUCTION);
        assert!(!p.use_reorder);
        assert_eq!(p.extra_info_size, 0);
    }

    #[test]
    fn test_from_json_partial() {
        let p = HGraphParams::from_json(
            r#"{"metric": "l2", "dim": 128, "max_degree": 16, "use_reorder": true}"#,
        )
        .unwrap();
        assert_eq!(p.metric, Metric::L2);
        assert_eq!(p.dim, 128);
        assert_eq!(p.max_degree, 16);
        assert!(p.use_reorder);
        // untouched knobs keep their defaults
        assert_eq!(p.ef_construction, DEFAULT_EF_CONSTRUCTION);
    }

    #[test]
    fn test_from_json_metric_aliases() {
        let p = HGraphParams::from_json(r#"{"metric": "ip", "dim": 8}"#).unwrap();
        assert_eq!(p.metric, Metric::InnerProduct);
        let p = HGraphParams::from_json(r#"{"metric": "cosine", "dim": 8}"#).unwrap();
        assert_eq!(p.metric, Metric::Cosine);
    }

    #[test]
    fn test_from_json_rejects_zero_dim() {
        assert!(HGraphParams::from_json(r#"{"metric": "l2"}"#).is_err());
    }

    #[test]
    fn test_search_params_from_json() {
        let p = SearchParams::from_json(r#"{"ef_search": 200}"#).unwrap();
        assert_eq!(p.ef_search, 200);
        assert!(SearchParams::from_json(r#"{"ef_search": 0}"#).is_err());
        assert_eq!(
            SearchParams::from_json("{}").unwrap().ef_search,
            DEFAULT_EF_SEARCH
        );
    }

    #[test]
    fn test_metric_wire_tags_roundtrip() {
        for m in [Metric::L2, Metric::InnerProduct, Metric::Cosine] {
            assert_eq!(Metric::from_u32(m.to_u32()).unwrap(), m);
        }
        assert!(Metric::from_u32(9).is_err());
    }
}
