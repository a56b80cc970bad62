//! The hierarchical graph index façade.
//!
//! [`HGraph`] owns the bottom graph, the sparse route graphs, the codecs and
//! the auxiliary tables, and wires them together for insertion, search and
//! persistence. All public operations take `&self`; the index is `Send +
//! Sync` and meant to be shared behind an `Arc`.
//!
//! Locking model: the mutable graph state sits behind one global
//! reader/writer lock. Normal inserts and searches hold it shared and
//! coordinate per node through the lock stripes; entry-point promotion,
//! capacity growth and (de)serialization hold it exclusively. A small
//! `add_lock` serializes the promotion decision itself.

use std::collections::{BinaryHeap, HashSet};
use std::io::{Read, Write};

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::{make_codecs, QueryComputer, VectorCodec};
use crate::error::{HGraphError, Result};
use crate::extra::ExtraInfoCell;
use crate::graph::{DenseGraphCell, GraphCell, SparseGraphCell};
use crate::idmap::{IdMap, InnerIdType, LabelType};
use crate::locks::NodeLocks;
use crate::params::{HGraphParams, Metric, SearchParams, RESIZE_BIT};
use crate::prune::mutually_connect;
use crate::search::{search_graph, Neighbor, SearchMode, SearchRequest};
use crate::visited::VisitedPool;

/// Marker payload emitted for a completely empty index.
const EMPTY_INDEX_MARKER: &[u8; 12] = b"EMPTY_HGRAPH";

/// A batch of points to insert: `labels[i]` owns `vectors[i*dim..(i+1)*dim]`
/// and, when the index stores extra info, `extra_info[i*size..(i+1)*size]`.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    pub labels: &'a [LabelType],
    pub vectors: &'a [f32],
    pub extra_info: Option<&'a [u8]>,
}

impl<'a> Dataset<'a> {
    pub fn new(labels: &'a [LabelType], vectors: &'a [f32]) -> Self {
        Self {
            labels,
            vectors,
            extra_info: None,
        }
    }

    pub fn with_extra_info(mut self, extra_info: &'a [u8]) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Search results in ascending-distance order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutput {
    pub labels: Vec<LabelType>,
    pub distances: Vec<f32>,
    /// Per-result payload blobs, present iff the index stores extra info.
    pub extra_info: Option<Vec<u8>>,
}

impl SearchOutput {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Mutable graph state guarded by the global reader/writer lock.
#[derive(Debug)]
struct GraphState {
    entry_point: InnerIdType,
    /// Sparse navigation layers; `route_graphs.len()` is the max level.
    route_graphs: Vec<SparseGraphCell>,
    bottom: DenseGraphCell,
    node_locks: NodeLocks,
    visited: VisitedPool,
    max_capacity: usize,
}

/// Hierarchical proximity-graph approximate nearest neighbor index.
#[derive(Debug)]
pub struct HGraph {
    dim: usize,
    metric: Metric,
    use_reorder: bool,
    max_degree: usize,
    ef_construct: usize,
    build_thread_count: usize,
    extra_info_size: usize,
    /// Level multiplier, `1 / ln(max_degree)`.
    mult: f64,

    state: RwLock<GraphState>,
    basic_codec: RwLock<Box<dyn VectorCodec>>,
    precise_codec: Option<RwLock<Box<dyn VectorCodec>>>,
    extra_infos: Option<RwLock<ExtraInfoCell>>,
    id_map: IdMap,

    /// Serializes whole `add` batches against each other.
    batch_lock: Mutex<()>,
    /// Serializes the promotion decision of concurrent point inserts.
    add_lock: Mutex<()>,
    level_rng: Mutex<StdRng>,
}

fn next_multiple_of_power_of_two(x: usize, bit: u64) -> usize {
    let y = 1usize << bit;
    (x + y - 1) & !(y - 1)
}

impl HGraph {
    pub fn new(params: &HGraphParams) -> Result<Self> {
        params.validate()?;
        let mult = 1.0 / (params.max_degree as f64).ln();
        let (basic, precise) = make_codecs(params.metric, params.dim, params.use_reorder);

        let initial_capacity = 1usize << RESIZE_BIT;
        let mut bottom = DenseGraphCell::new(params.max_degree);
        bottom.resize(initial_capacity)?;

        let id_map = IdMap::new();
        id_map.resize(initial_capacity)?;

        Ok(Self {
            dim: params.dim,
            metric: params.metric,
            use_reorder: params.use_reorder,
            max_degree: params.max_degree,
            ef_construct: params.ef_construction,
            build_thread_count: params.build_thread_count,
            extra_info_size: params.extra_info_size,
            mult,
            state: RwLock::new(GraphState {
                entry_point: 0,
                route_graphs: Vec::new(),
                bottom,
                node_locks: NodeLocks::new(initial_capacity),
                visited: VisitedPool::new(initial_capacity),
                max_capacity: initial_capacity,
            }),
            basic_codec: RwLock::new(basic),
            precise_codec: precise.map(RwLock::new),
            extra_infos: (params.extra_info_size > 0)
                .then(|| RwLock::new(ExtraInfoCell::new(params.extra_info_size))),
            id_map,
            batch_lock: Mutex::new(()),
            add_lock: Mutex::new(()),
            level_rng: Mutex::new(StdRng::seed_from_u64(params.random_seed)),
        })
    }

    /// Construct from a JSON parameter string.
    pub fn from_json_params(json: &str) -> Result<Self> {
        Self::new(&HGraphParams::from_json(json)?)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of inserted points.
    pub fn num_elements(&self) -> usize {
        self.state.read().bottom.total_count()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    pub fn contains_label(&self, label: LabelType) -> bool {
        self.id_map.contains(label)
    }

    /// Build an index from a dataset. Codec storage is memory-resident, so
    /// this is the same pipeline as [`HGraph::add`].
    pub fn build(&self, data: &Dataset<'_>) -> Result<Vec<i64>> {
        tracing::info!(count = data.labels.len(), "building index");
        self.add(data)
    }

    /// Insert a batch of points.
    ///
    /// Duplicate labels (against the index or within the batch) are skipped;
    /// the returned list holds their input indices, in input order. Points
    /// between rejects are inserted in contiguous runs, in parallel when
    /// `build_thread_count > 1`.
    pub fn add(&self, data: &Dataset<'_>) -> Result<Vec<i64>> {
        self.validate_dataset(data)?;
        let _batch = self.batch_lock.lock();

        let count = data.labels.len();
        let mut failed: Vec<i64> = Vec::new();
        let mut batch_labels: HashSet<LabelType> = HashSet::with_capacity(count);
        for (i, &label) in data.labels.iter().enumerate() {
            if self.id_map.contains(label) || !batch_labels.insert(label) {
                failed.push(i as i64);
            }
        }

        // Contiguous runs between rejected indices.
        let mut start: i64 = -1;
        let mut bounds = failed.clone();
        bounds.push(count as i64);
        for &end in &bounds {
            if end - start > 1 {
                self.insert_run(data, (start + 1) as usize, end as usize)?;
            }
            start = end;
        }

        tracing::info!(
            inserted = count - failed.len(),
            rejected = failed.len(),
            total = self.num_elements(),
            "added batch"
        );
        Ok(failed)
    }

    /// Insert one duplicate-free contiguous run of the dataset.
    fn insert_run(&self, data: &Dataset<'_>, start: usize, end: usize) -> Result<()> {
        let count = end - start;
        let run_labels = &data.labels[start..end];
        let run_vectors = &data.vectors[start * self.dim..end * self.dim];

        let base = {
            let mut st = self.state.write();
            let current = st.bottom.total_count();
            self.grow(&mut st, current + count)?;
            current
        };

        {
            let mut basic = self.basic_codec.write();
            basic.train(run_vectors);
            basic.batch_insert(run_vectors);
        }
        if let Some(precise) = &self.precise_codec {
            let mut precise = precise.write();
            precise.train(run_vectors);
            precise.batch_insert(run_vectors);
        }
        if let Some(extra) = &self.extra_infos {
            let buf = &data.extra_info.expect("validated")
                [start * self.extra_info_size..end * self.extra_info_size];
            extra.write().batch_insert(buf, count);
        }

        let threads = self.build_thread_count.min(count);
        if threads <= 1 {
            for i in 0..count {
                let vector = &run_vectors[i * self.dim..(i + 1) * self.dim];
                self.insert_point(run_labels[i], vector, (base + i) as InnerIdType);
            }
        } else {
            let chunk = count.div_ceil(threads);
            std::thread::scope(|scope| {
                for t in 0..threads {
                    let begin = t * chunk;
                    let stop = ((t + 1) * chunk).min(count);
                    if begin >= stop {
                        continue;
                    }
                    scope.spawn(move || {
                        for i in begin..stop {
                            let vector = &run_vectors[i * self.dim..(i + 1) * self.dim];
                            self.insert_point(run_labels[i], vector, (base + i) as InnerIdType);
                        }
                    });
                }
            });
        }
        Ok(())
    }

    /// Insert a single point, choosing the promotion or the common path.
    fn insert_point(&self, label: LabelType, vector: &[f32], inner_id: InnerIdType) {
        self.id_map.bind(label, inner_id);

        // stored level: the drawn level minus one; -1 means bottom-only
        let level = self.random_level() - 1;

        let add_guard = self.add_lock.lock();
        let promote = {
            let st = self.state.read();
            level >= st.route_graphs.len() as i32 || st.bottom.total_count() == 0
        };
        if promote {
            let mut st = self.state.write();
            while (st.route_graphs.len() as i32) <= level {
                st.route_graphs
                    .push(SparseGraphCell::new(self.max_degree / 2));
            }
            self.add_one_point(&st, vector, level, inner_id);
            st.entry_point = inner_id;
            drop(st);
            drop(add_guard);
        } else {
            drop(add_guard);
            let st = self.state.read();
            self.add_one_point(&st, vector, level, inner_id);
        }
    }

    /// Link one point into every layer it belongs to. The caller holds the
    /// global lock (shared on the common path, exclusive on promotion).
    fn add_one_point(&self, st: &GraphState, vector: &[f32], level: i32, inner_id: InnerIdType) {
        // Construction distances use the precise codec when reordering.
        let codec_guard = match &self.precise_codec {
            Some(precise) if self.use_reorder => precise.read(),
            _ => self.basic_codec.read(),
        };
        let codec: &dyn VectorCodec = &**codec_guard;
        let computer = codec.computer(vector);

        let mut ep = st.entry_point;

        // Navigate the layers above `level` with a beam of one.
        let mut j = st.route_graphs.len() as i32 - 1;
        while j > level {
            let req = SearchRequest {
                ep,
                ef: 1,
                ..Default::default()
            };
            let result = search_graph(
                &st.route_graphs[j as usize],
                codec,
                &computer,
                &st.node_locks,
                &st.visited,
                &req,
            );
            if let Some(best) = result.peek() {
                ep = best.id;
            }
            j -= 1;
        }

        // Search-and-link at every owned layer, route graphs first.
        let mut j = level;
        while j >= 0 {
            let cell = &st.route_graphs[j as usize];
            if cell.total_count() != 0 {
                let req = SearchRequest {
                    ep,
                    ef: self.ef_construct,
                    ..Default::default()
                };
                let result =
                    search_graph(cell, codec, &computer, &st.node_locks, &st.visited, &req);
                ep = mutually_connect(inner_id, result, cell, codec, &st.node_locks);
            } else {
                let _guard = st.node_locks.unique(inner_id);
                cell.insert_neighbors(inner_id, Vec::new());
            }
            cell.increase_total_count(1);
            j -= 1;
        }

        if st.bottom.total_count() != 0 {
            let req = SearchRequest {
                ep,
                ef: self.ef_construct,
                ..Default::default()
            };
            let result = search_graph(
                &st.bottom,
                codec,
                &computer,
                &st.node_locks,
                &st.visited,
                &req,
            );
            mutually_connect(inner_id, result, &st.bottom, codec, &st.node_locks);
        } else {
            let _guard = st.node_locks.unique(inner_id);
            st.bottom.insert_neighbors(inner_id, Vec::new());
        }
        st.bottom.increase_total_count(1);
    }

    /// Draw a level from the exponential distribution `floor(-ln(U) * mult)`.
    fn random_level(&self) -> i32 {
        let mut rng = self.level_rng.lock();
        let u: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
        (-u.ln() * self.mult).floor() as i32
    }

    /// Grow capacity to cover `required` slots, rounded up to the next
    /// multiple of `1 << RESIZE_BIT`. Holds the global write lock.
    fn grow(&self, st: &mut GraphState, required: usize) -> Result<()> {
        let new_capacity = next_multiple_of_power_of_two(required, RESIZE_BIT);
        if st.max_capacity < new_capacity {
            st.bottom.resize(new_capacity)?;
            st.node_locks.resize(new_capacity);
            st.visited = VisitedPool::new(new_capacity);
            self.id_map.resize(new_capacity)?;
            st.max_capacity = new_capacity;
            tracing::debug!(capacity = new_capacity, "grew index capacity");
        }
        Ok(())
    }

    fn validate_dataset(&self, data: &Dataset<'_>) -> Result<()> {
        let count = data.labels.len();
        if data.vectors.len() != count * self.dim {
            return Err(HGraphError::InvalidArgument(format!(
                "base vectors hold {} floats, expected count({count}) * dim({})",
                data.vectors.len(),
                self.dim
            )));
        }
        if self.extra_info_size > 0 {
            let buf = data.extra_info.ok_or_else(|| {
                HGraphError::InvalidArgument(
                    "index stores extra info but the dataset provides none".into(),
                )
            })?;
            if buf.len() != count * self.extra_info_size {
                return Err(HGraphError::InvalidArgument(format!(
                    "extra info holds {} bytes, expected count({count}) * size({})",
                    buf.len(),
                    self.extra_info_size
                )));
            }
        }
        Ok(())
    }

    /// Descend the route graphs toward the query with a beam of one.
    fn descend(
        &self,
        st: &GraphState,
        codec: &dyn VectorCodec,
        computer: &QueryComputer,
    ) -> InnerIdType {
        let mut ep = st.entry_point;
        for j in (0..st.route_graphs.len()).rev() {
            let req = SearchRequest {
                ep,
                ef: 1,
                ..Default::default()
            };
            let result = search_graph(
                &st.route_graphs[j],
                codec,
                computer,
                &st.node_locks,
                &st.visited,
                &req,
            );
            if let Some(best) = result.peek() {
                ep = best.id;
            }
        }
        ep
    }

    /// Top-k search.
    ///
    /// `filter`, when present, admits results by label; filtered nodes still
    /// participate in navigation. Returns up to `min(k, n)` results; an empty
    /// index yields an empty output.
    pub fn knn_search(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParams,
        filter: Option<&(dyn Fn(LabelType) -> bool + Sync)>,
    ) -> Result<SearchOutput> {
        if query.len() != self.dim {
            return Err(HGraphError::InvalidArgument(format!(
                "query.dim({}) must be equal to index.dim({})",
                query.len(),
                self.dim
            )));
        }
        if k == 0 {
            return Err(HGraphError::InvalidArgument(
                "k(0) must be greater than 0".into(),
            ));
        }

        let st = self.state.read();
        let total = st.bottom.total_count();
        if total == 0 {
            return Ok(SearchOutput::default());
        }
        let k = k.min(total);

        let basic = self.basic_codec.read();
        let computer = basic.computer(query);
        let ep = self.descend(&st, &**basic, &computer);

        let inner_filter_storage;
        let inner_filter: Option<&(dyn Fn(InnerIdType) -> bool + Sync)> = match filter {
            Some(f) => {
                inner_filter_storage = move |id: InnerIdType| f(self.id_map.label_of(id));
                Some(&inner_filter_storage)
            }
            None => None,
        };

        let req = SearchRequest {
            ep,
            ef: params.ef_search.max(k),
            mode: SearchMode::Knn,
            // with reordering the rescoring pass sees the whole beam
            topk: (!self.use_reorder).then_some(k),
            filter: inner_filter,
            ..Default::default()
        };
        let mut result = search_graph(
            &st.bottom,
            &**basic,
            &computer,
            &st.node_locks,
            &st.visited,
            &req,
        );

        if self.use_reorder {
            let precise = self
                .precise_codec
                .as_ref()
                .expect("precise codec present when use_reorder")
                .read();
            self.reorder(&**precise, query, &mut result, k);
        }
        while result.len() > k {
            result.pop();
        }

        self.make_output(result)
    }

    /// Radius search.
    ///
    /// Returns every admitted point within `radius` (plus a small float
    /// tolerance). `limit < 0` means unlimited; `limit == 0` is an error.
    pub fn range_search(
        &self,
        query: &[f32],
        radius: f32,
        params: &SearchParams,
        filter: Option<&(dyn Fn(LabelType) -> bool + Sync)>,
        limit: i64,
    ) -> Result<SearchOutput> {
        if query.len() != self.dim {
            return Err(HGraphError::InvalidArgument(format!(
                "query.dim({}) must be equal to index.dim({})",
                query.len(),
                self.dim
            )));
        }
        if radius < 0.0 {
            return Err(HGraphError::InvalidArgument(format!(
                "radius({radius}) must be greater equal than 0"
            )));
        }
        if limit == 0 {
            return Err(HGraphError::InvalidArgument(
                "limited_size(0) must not be equal to 0".into(),
            ));
        }
        let limit = (limit > 0).then_some(limit as usize);

        let st = self.state.read();
        if st.bottom.total_count() == 0 {
            return Ok(SearchOutput::default());
        }

        let basic = self.basic_codec.read();
        let computer = basic.computer(query);
        let ep = self.descend(&st, &**basic, &computer);

        let inner_filter_storage;
        let inner_filter: Option<&(dyn Fn(InnerIdType) -> bool + Sync)> = match filter {
            Some(f) => {
                inner_filter_storage = move |id: InnerIdType| f(self.id_map.label_of(id));
                Some(&inner_filter_storage)
            }
            None => None,
        };

        let req = SearchRequest {
            ep,
            ef: params.ef_search.max(limit.unwrap_or(0)),
            mode: SearchMode::Range,
            radius,
            limit,
            filter: inner_filter,
            ..Default::default()
        };
        let mut result = search_graph(
            &st.bottom,
            &**basic,
            &computer,
            &st.node_locks,
            &st.visited,
            &req,
        );

        if self.use_reorder {
            let precise = self
                .precise_codec
                .as_ref()
                .expect("precise codec present when use_reorder")
                .read();
            self.reorder(&**precise, query, &mut result, limit.unwrap_or(0));
        }
        if let Some(limit) = limit {
            while result.len() > limit {
                result.pop();
            }
        }

        self.make_output(result)
    }

    /// Distance between `vector` and the stored code of `label`, computed
    /// with the precise codec when reordering is enabled.
    pub fn calculate_distance_by_id(&self, vector: &[f32], label: LabelType) -> Result<f32> {
        if vector.len() != self.dim {
            return Err(HGraphError::InvalidArgument(format!(
                "vector.dim({}) must be equal to index.dim({})",
                vector.len(),
                self.dim
            )));
        }
        let inner_id = self.id_map.inner_of(label).ok_or_else(|| {
            HGraphError::InvalidArgument(format!("failed to find label: {label}"))
        })?;
        let codec_guard = match &self.precise_codec {
            Some(precise) if self.use_reorder => precise.read(),
            _ => self.basic_codec.read(),
        };
        let computer = codec_guard.computer(vector);
        Ok(codec_guard.query_one(&computer, inner_id))
    }

    /// Rescore the candidate heap with a higher-precision codec, keeping at
    /// most `k` entries (`k == 0` keeps them all).
    fn reorder(
        &self,
        codec: &dyn VectorCodec,
        query: &[f32],
        heap: &mut BinaryHeap<Neighbor>,
        k: usize,
    ) {
        let size = heap.len();
        if size == 0 {
            return;
        }
        let k = if k == 0 { size } else { k };
        let mut ids = Vec::with_capacity(size);
        while let Some(n) = heap.pop() {
            ids.push(n.id);
        }
        let computer = codec.computer(query);
        let mut dists = vec![0.0f32; size];
        codec.query(&mut dists, &computer, &ids);
        for i in 0..size {
            if heap.len() < k || dists[i] <= heap.peek().expect("non-empty").distance.0 {
                heap.push(Neighbor::new(dists[i], ids[i]));
            }
            if heap.len() > k {
                heap.pop();
            }
        }
    }

    /// Drain the result heap into ascending-distance output arrays.
    fn make_output(&self, mut heap: BinaryHeap<Neighbor>) -> Result<SearchOutput> {
        let n = heap.len();
        let mut labels = vec![0 as LabelType; n];
        let mut distances = vec![0.0f32; n];
        let mut extra_info =
            (self.extra_info_size > 0).then(|| vec![0u8; n * self.extra_info_size]);
        let extra_guard = self.extra_infos.as_ref().map(|e| e.read());

        let mut idx = n;
        while let Some(worst) = heap.pop() {
            idx -= 1;
            labels[idx] = self.id_map.label_of(worst.id);
            distances[idx] = worst.distance.0;
            if let (Some(buf), Some(cell)) = (extra_info.as_mut(), extra_guard.as_ref()) {
                let dst = &mut buf[idx * self.extra_info_size..(idx + 1) * self.extra_info_size];
                cell.get(worst.id, dst);
            }
        }

        Ok(SearchOutput {
            labels,
            distances,
            extra_info,
        })
    }

    /// Write the index to a byte stream.
    ///
    /// An empty index is emitted as a short marker payload. The write lock is
    /// held for the duration, so the snapshot is consistent.
    pub fn serialize(&self, writer: &mut dyn Write) -> Result<()> {
        use crate::io;

        let mut st = self.state.write();
        if st.bottom.total_count() == 0 {
            writer.write_all(EMPTY_INDEX_MARKER)?;
            return Ok(());
        }

        io::write_u8(writer, self.use_reorder as u8)?;
        io::write_u64(writer, self.dim as u64)?;
        io::write_u32(writer, self.metric.to_u32())?;
        io::write_u64(writer, st.route_graphs.len() as u64)?;
        io::write_u32(writer, st.entry_point)?;
        io::write_u64(writer, self.ef_construct as u64)?;
        io::write_f64(writer, self.mult)?;
        io::write_u64(writer, st.max_capacity as u64)?;

        io::write_i64_slice(writer, &self.id_map.labels_snapshot())?;
        let pairs = self.id_map.lookup_snapshot();
        io::write_u64(writer, pairs.len() as u64)?;
        for (label, inner_id) in pairs {
            io::write_i64(writer, label)?;
            io::write_u32(writer, inner_id)?;
        }

        self.basic_codec.read().serialize(writer)?;
        st.bottom.serialize(writer)?;
        if let Some(precise) = &self.precise_codec {
            precise.read().serialize(writer)?;
        }
        for cell in &st.route_graphs {
            cell.serialize(writer)?;
        }
        if let Some(extra) = &self.extra_infos {
            extra.read().serialize(writer)?;
        }

        tracing::info!(
            elements = st.bottom.total_count(),
            levels = st.route_graphs.len(),
            "serialized index"
        );
        Ok(())
    }

    /// Reconstitute the index from a byte stream produced by
    /// [`HGraph::serialize`] on an index with the same parameters.
    ///
    /// Fails with [`HGraphError::IndexNotEmpty`] when points have already
    /// been inserted. All sections are decoded and validated before any
    /// existing state is replaced.
    pub fn deserialize(&self, reader: &mut dyn Read) -> Result<()> {
        use crate::io;

        let mut st = self.state.write();
        if st.bottom.total_count() > 0 {
            return Err(HGraphError::IndexNotEmpty);
        }

        let first = io::read_u8(reader)?;
        if first == EMPTY_INDEX_MARKER[0] {
            let mut rest = [0u8; EMPTY_INDEX_MARKER.len() - 1];
            reader.read_exact(&mut rest)?;
            if rest == EMPTY_INDEX_MARKER[1..] {
                return Ok(());
            }
            return Err(HGraphError::ReadError(
                "corrupted empty-index marker".into(),
            ));
        }

        let use_reorder = first != 0;
        let dim = io::read_u64(reader)? as usize;
        let metric = Metric::from_u32(io::read_u32(reader)?)?;
        if use_reorder != self.use_reorder || dim != self.dim || metric != self.metric {
            return Err(HGraphError::ReadError(format!(
                "serialized index (dim={dim}, metric={metric:?}, use_reorder={use_reorder}) \
                 does not match this index's parameters"
            )));
        }
        let max_level = io::read_u64(reader)? as usize;
        let entry_point = io::read_u32(reader)?;
        let ef_construct = io::read_u64(reader)? as usize;
        let mult = io::read_f64(reader)?;
        if ef_construct != self.ef_construct || mult.to_bits() != self.mult.to_bits() {
            return Err(HGraphError::ReadError(
                "serialized construction parameters do not match this index".into(),
            ));
        }
        let max_capacity = io::read_u64(reader)? as usize;

        let labels = io::read_i64_vec(reader)?;
        if labels.len() != max_capacity {
            return Err(HGraphError::ReadError(format!(
                "label table holds {} entries, expected max_capacity({max_capacity})",
                labels.len()
            )));
        }
        let lookup_size = io::read_len(reader, 12)?;
        let mut pairs = Vec::with_capacity(lookup_size);
        for _ in 0..lookup_size {
            let label = io::read_i64(reader)?;
            let inner_id = io::read_u32(reader)?;
            if inner_id as usize >= max_capacity {
                return Err(HGraphError::ReadError(format!(
                    "label lookup maps to inner id {inner_id} >= max_capacity({max_capacity})"
                )));
            }
            pairs.push((label, inner_id));
        }
        if (entry_point as usize) >= max_capacity {
            return Err(HGraphError::ReadError(format!(
                "entry point {entry_point} >= max_capacity({max_capacity})"
            )));
        }

        // Decode every section into fresh collaborators before committing.
        let (mut basic, mut precise) = make_codecs(self.metric, self.dim, self.use_reorder);
        basic.deserialize(reader)?;

        let mut bottom = DenseGraphCell::new(self.max_degree);
        bottom.deserialize(reader)?;
        if bottom.max_capacity() != max_capacity {
            return Err(HGraphError::ReadError(format!(
                "bottom graph capacity {} differs from header max_capacity({max_capacity})",
                bottom.max_capacity()
            )));
        }
        if basic.total_count() != bottom.total_count() {
            return Err(HGraphError::ReadError(format!(
                "codec holds {} codes but the graph holds {} nodes",
                basic.total_count(),
                bottom.total_count()
            )));
        }

        if let Some(precise) = precise.as_mut() {
            precise.deserialize(reader)?;
        }

        let mut route_graphs = Vec::with_capacity(max_level);
        for _ in 0..max_level {
            let mut cell = SparseGraphCell::new(self.max_degree / 2);
            cell.deserialize(reader)?;
            route_graphs.push(cell);
        }

        let mut extra = (self.extra_info_size > 0)
            .then(|| ExtraInfoCell::new(self.extra_info_size));
        if let Some(extra) = extra.as_mut() {
            extra.deserialize(reader)?;
        }

        // Commit.
        let elements = bottom.total_count();
        st.bottom = bottom;
        st.route_graphs = route_graphs;
        st.entry_point = entry_point;
        st.node_locks.resize(max_capacity);
        st.visited = VisitedPool::new(max_capacity);
        st.max_capacity = max_capacity;
        self.id_map.restore(labels, pairs);
        *self.basic_codec.write() = basic;
        if let (Some(slot), Some(codec)) = (self.precise_codec.as_ref(), precise) {
            *slot.write() = codec;
        }
        if let (Some(slot), Some(cell)) = (self.extra_infos.as_ref(), extra) {
            *slot.write() = cell;
        }

        tracing::info!(elements, levels = max_level, "deserialized index");
        Ok(())
    }

    /// Check structural invariants of the graph and the id mapping.
    ///
    /// Walks every layer verifying degree caps, bidirectional edges,
    /// layer-membership monotonicity and the label bijection. Intended for
    /// tests and post-restore sanity checks; cost is O(edges).
    pub fn validate(&self) -> std::result::Result<(), String> {
        let st = self.state.read();
        let total = st.bottom.total_count();
        if total == 0 {
            return Ok(());
        }
        if self.id_map.len() != total {
            return Err(format!(
                "label lookup holds {} entries, graph holds {total} nodes",
                self.id_map.len()
            ));
        }
        for inner_id in 0..total as InnerIdType {
            let label = self.id_map.label_of(inner_id);
            if self.id_map.inner_of(label) != Some(inner_id) {
                return Err(format!("label {label} does not map back to inner id {inner_id}"));
            }
        }

        let check_layer = |cell: &dyn GraphCell, ids: &[InnerIdType], name: &str| {
            let mut neighbors = Vec::new();
            let mut reverse = Vec::new();
            for &u in ids {
                {
                    let _guard = st.node_locks.shared(u);
                    cell.get_neighbors(u, &mut neighbors);
                }
                if neighbors.len() > cell.maximum_degree() {
                    return Err(format!(
                        "{name}: node {u} has {} neighbors, cap {}",
                        neighbors.len(),
                        cell.maximum_degree()
                    ));
                }
                for (i, &v) in neighbors.iter().enumerate() {
                    if v == u {
                        return Err(format!("{name}: node {u} links to itself"));
                    }
                    if v as usize >= total {
                        return Err(format!("{name}: node {u} links to absent node {v}"));
                    }
                    if neighbors[..i].contains(&v) {
                        return Err(format!("{name}: node {u} lists {v} twice"));
                    }
                    {
                        let _guard = st.node_locks.shared(v);
                        cell.get_neighbors(v, &mut reverse);
                    }
                    if !reverse.contains(&u) {
                        return Err(format!("{name}: edge {u} -> {v} missing its reverse"));
                    }
                }
            }
            Ok(())
        };

        let bottom_ids: Vec<InnerIdType> = (0..total as InnerIdType).collect();
        check_layer(&st.bottom, &bottom_ids, "bottom")?;
        for (level, cell) in st.route_graphs.iter().enumerate() {
            let ids = cell.node_ids();
            check_layer(cell, &ids, &format!("route[{level}]"))?;
            if level > 0 {
                let below = &st.route_graphs[level - 1];
                for &id in &ids {
                    if !below.has_node(id) {
                        return Err(format!(
                            "node {id} present at route[{level}] but not route[{}]",
                            level - 1
                        ));
                    }
                }
            }
        }

        // the entry point was promoted through every level
        for (level, cell) in st.route_graphs.iter().enumerate() {
            if !cell.has_node(st.entry_point) {
                return Err(format!(
                    "entry point {} missing from route[{level}]",
                    st.entry_point
                ));
            }
        }
        Ok(())
    }

    /// Rough at-rest memory estimate for an index of `num_elements` points,
    /// with memory-resident stores rounded up to `block_size_limit` blocks.
    pub fn estimate_memory(&self, num_elements: usize, block_size_limit: usize) -> usize {
        let element_count = next_multiple_of_power_of_two(num_elements, RESIZE_BIT);
        let block_ceil = |memory: usize| memory.div_ceil(block_size_limit) * block_size_limit;

        let mut estimate = 0usize;

        let basic = self.basic_codec.read();
        if basic.in_memory() {
            estimate += block_ceil(basic.code_size() * element_count);
        }
        estimate += block_ceil(
            (self.max_degree + 1) * std::mem::size_of::<InnerIdType>() * element_count,
        );
        if let Some(precise) = &self.precise_codec {
            let precise = precise.read();
            if precise.in_memory() {
                estimate += block_ceil(precise.code_size() * element_count);
            }
        }
        if self.extra_info_size > 0 {
            estimate += block_ceil(self.extra_info_size * element_count);
        }

        // label map entries plus hash-table overhead
        estimate += element_count
            * (std::mem::size_of::<(LabelType, InnerIdType)>()
                + 2 * std::mem::size_of::<usize>());
        // expected sparse-graph share of the hierarchy
        estimate += (self.mult * 0.05 * element_count as f64) as usize
            * std::mem::size_of::<InnerIdType>()
            * (self.max_degree / 2 + 1);
        estimate += element_count
            * (std::mem::size_of::<LabelType>() + std::mem::size_of::<RwLock<()>>());

        estimate
    }
}
