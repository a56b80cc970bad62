//! Best-first beam search over a single graph layer.
//!
//! Maintains two heaps: a min-ordered frontier of candidates to expand and a
//! max-heap of the `ef` best admitted results. Neighbor lists are copied out
//! under the node's stripe lock, then distances for all unvisited neighbors
//! are computed in one batched codec call. A pooled visited set guarantees
//! each node is relaxed at most once per call.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::codec::{QueryComputer, VectorCodec};
use crate::graph::GraphCell;
use crate::idmap::InnerIdType;
use crate::locks::NodeLocks;
use crate::visited::VisitedPool;

/// Slack added to the radius when trimming range results, absorbing float
/// noise between navigation and post-filter distances.
pub(crate) const RADIUS_EPSILON: f32 = 2e-6;

/// A scored node. Max-heap ordering by distance, ties broken by id so heap
/// contents are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Neighbor {
    pub distance: OrderedFloat<f32>,
    pub id: InnerIdType,
}

impl Neighbor {
    #[inline]
    pub fn new(distance: f32, id: InnerIdType) -> Self {
        Self {
            distance: OrderedFloat(distance),
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchMode {
    Knn,
    Range,
}

/// Parameters of one layer traversal.
pub(crate) struct SearchRequest<'a> {
    pub ep: InnerIdType,
    pub ef: usize,
    pub mode: SearchMode,
    /// KNN: trim the result heap to this size after the traversal.
    pub topk: Option<usize>,
    /// RANGE only.
    pub radius: f32,
    /// RANGE: trim the result heap to this size after the traversal.
    pub limit: Option<usize>,
    /// Admission filter over inner ids; filtered nodes still navigate.
    pub filter: Option<&'a (dyn Fn(InnerIdType) -> bool + Sync)>,
}

impl Default for SearchRequest<'_> {
    fn default() -> Self {
        Self {
            ep: 0,
            ef: 1,
            mode: SearchMode::Knn,
            topk: None,
            radius: 0.0,
            limit: None,
            filter: None,
        }
    }
}

/// Traverse one layer and return the result max-heap.
pub(crate) fn search_graph(
    graph: &dyn GraphCell,
    codec: &dyn VectorCodec,
    computer: &QueryComputer,
    locks: &NodeLocks,
    pool: &VisitedPool,
    req: &SearchRequest<'_>,
) -> BinaryHeap<Neighbor> {
    let mut visited = pool.acquire();

    let admitted = |id: InnerIdType| req.filter.map_or(true, |f| f(id));

    let mut candidates: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::with_capacity(req.ef * 2);
    let mut top: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(req.ef + 1);
    let mut lower_bound = f32::MAX;

    let d0 = codec.query_one(computer, req.ep);
    visited.insert(req.ep);
    if admitted(req.ep) {
        top.push(Neighbor::new(d0, req.ep));
        lower_bound = d0;
    }
    if req.mode == SearchMode::Range && d0 > req.radius && !top.is_empty() {
        top.pop();
    }
    candidates.push(Reverse(Neighbor::new(d0, req.ep)));

    let max_degree = graph.maximum_degree();
    let mut neighbors: Vec<InnerIdType> = Vec::with_capacity(max_degree);
    let mut to_visit: Vec<InnerIdType> = Vec::with_capacity(max_degree);
    let mut dists = vec![0.0f32; max_degree];

    while let Some(&Reverse(current)) = candidates.peek() {
        if req.mode == SearchMode::Knn && current.distance.0 > lower_bound && top.len() == req.ef {
            break;
        }
        candidates.pop();

        {
            let _guard = locks.shared(current.id);
            graph.get_neighbors(current.id, &mut neighbors);
        }
        if let Some(&first) = neighbors.first() {
            codec.prefetch(first);
        }

        to_visit.clear();
        for &n in &neighbors {
            if visited.insert(n) {
                to_visit.push(n);
            }
        }

        codec.query(&mut dists[..to_visit.len()], computer, &to_visit);

        for (i, &n) in to_visit.iter().enumerate() {
            let dist = dists[i];
            let in_range = req.mode == SearchMode::Range && dist <= req.radius;
            if top.len() < req.ef || dist < lower_bound || in_range {
                candidates.push(Reverse(Neighbor::new(dist, n)));
                if admitted(n) {
                    top.push(Neighbor::new(dist, n));
                }
                if req.mode == SearchMode::Knn && top.len() > req.ef {
                    top.pop();
                }
                if let Some(worst) = top.peek() {
                    lower_bound = worst.distance.0;
                }
            }
        }
    }

    match req.mode {
        SearchMode::Knn => {
            if let Some(topk) = req.topk {
                while top.len() > topk {
                    top.pop();
                }
            }
        }
        SearchMode::Range => {
            if let Some(limit) = req.limit {
                while top.len() > limit {
                    top.pop();
                }
            }
            while top
                .peek()
                .is_some_and(|worst| worst.distance.0 > req.radius + RADIUS_EPSILON)
            {
                top.pop();
            }
        }
    }

    top
}
