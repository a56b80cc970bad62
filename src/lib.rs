//! # hgraph
//!
//! Hierarchical proximity-graph approximate nearest neighbor index over dense
//! float vectors. Inserting a stream of (label, vector) pairs builds a
//! multi-layer navigable small-world graph; queries answer top-k and radius
//! searches with a tunable accuracy/latency trade-off (`ef`), optionally
//! rescoring candidates with an exact f32 codec. The whole index persists to
//! and restores from a plain byte stream.
//!
//! Graph navigation runs over scalar-quantized codes (4x smaller than f32)
//! while construction and reordering can use exact vectors, so recall stays
//! close to a full-precision index at a fraction of the memory.
//!
//! ```
//! use hgraph::{Dataset, HGraph, HGraphParams, SearchParams};
//!
//! # fn main() -> hgraph::Result<()> {
//! let index = HGraph::new(&HGraphParams {
//!     dim: 4,
//!     max_degree: 16,
//!     ..HGraphParams::default()
//! })?;
//!
//! let labels = vec![1i64, 2];
//! let vectors = vec![
//!     0.0, 0.0, 0.0, 0.0, //
//!     1.0, 1.0, 1.0, 1.0,
//! ];
//! index.build(&Dataset::new(&labels, &vectors))?;
//!
//! let nearest = index.knn_search(&[0.1, 0.0, 0.0, 0.0], 1, &SearchParams::default(), None)?;
//! assert_eq!(nearest.labels, vec![1]);
//! # Ok(())
//! # }
//! ```

/// Vector codecs: quantized and exact distance stores.
pub mod codec;
/// Error kinds returned by public operations.
pub mod error;
/// Fixed-size per-point payload store.
pub mod extra;
/// Per-layer adjacency storage.
pub mod graph;
/// Label ↔ inner-id mapping.
pub mod idmap;
/// The index façade: build, search, persistence.
pub mod index;
/// Little-endian stream primitives for the at-rest format.
pub mod io;
/// Sharded per-node lock stripes.
pub mod locks;
/// Index and search parameters.
pub mod params;
/// Best-first beam search over one layer.
mod search;
/// Neighbor selection and mutual linking.
mod prune;
/// Generation-tagged visited sets and their pool.
pub mod visited;

pub use error::{HGraphError, Result};
pub use idmap::{InnerIdType, LabelType};
pub use index::{Dataset, HGraph, SearchOutput};
pub use params::{HGraphParams, Metric, SearchParams};
