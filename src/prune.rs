//! Neighbor selection and mutual linking for new points.
//!
//! Selection keeps a candidate only when it is not dominated by an
//! already-chosen closer point: `v` joins the selected set iff
//! `distance(v, w) > distance(v, query-node)` for every selected `w`. The
//! chosen neighbors are then linked bidirectionally, repruning any existing
//! node pushed over the layer's degree cap by the reciprocal edge.
//!
//! Lock discipline: the new node's stripe is taken for its own list write and
//! released before any neighbor stripe is taken — at most one stripe is held
//! at a time, so the stripes cannot deadlock regardless of id collisions.

use std::collections::BinaryHeap;

use crate::codec::VectorCodec;
use crate::graph::GraphCell;
use crate::idmap::InnerIdType;
use crate::locks::NodeLocks;
use crate::search::Neighbor;

/// Apply the not-dominated rule to an ascending-distance candidate list,
/// keeping at most `m` entries.
fn select_neighbors(
    ascending: &[Neighbor],
    m: usize,
    codec: &dyn VectorCodec,
) -> Vec<Neighbor> {
    let mut selected: Vec<Neighbor> = Vec::with_capacity(m);
    for &candidate in ascending {
        if selected.len() >= m {
            break;
        }
        let dominated = selected
            .iter()
            .any(|s| codec.distance_by_id(candidate.id, s.id) <= candidate.distance.0);
        if !dominated {
            selected.push(candidate);
        }
    }
    selected
}

/// Connect `inner_id` to up to `maximum_degree` of the search candidates and
/// add the reciprocal edges. Returns the closest selected neighbor, which
/// seeds the descent into the next lower layer.
pub(crate) fn mutually_connect(
    inner_id: InnerIdType,
    top_candidates: BinaryHeap<Neighbor>,
    graph: &dyn GraphCell,
    codec: &dyn VectorCodec,
    locks: &NodeLocks,
) -> InnerIdType {
    let m = graph.maximum_degree();
    let ascending = top_candidates.into_sorted_vec();
    let selected = select_neighbors(&ascending, m, codec);

    let Some(closest) = selected.first().map(|n| n.id) else {
        // An empty candidate heap only happens on an empty layer, which the
        // builder handles separately.
        debug_assert!(ascending.is_empty());
        return inner_id;
    };

    let ids: Vec<InnerIdType> = selected.iter().map(|n| n.id).collect();
    {
        let _guard = locks.unique(inner_id);
        graph.insert_neighbors(inner_id, ids.clone());
    }

    let mut neighbors: Vec<InnerIdType> = Vec::with_capacity(m + 1);
    for &w in &ids {
        let _guard = locks.unique(w);
        graph.get_neighbors(w, &mut neighbors);
        if neighbors.contains(&inner_id) {
            continue;
        }
        neighbors.push(inner_id);
        if neighbors.len() > m {
            // Reprune w's list with the same rule, distances relative to w.
            let mut candidates: Vec<Neighbor> = neighbors
                .iter()
                .map(|&x| Neighbor::new(codec.distance_by_id(w, x), x))
                .collect();
            candidates.sort_unstable();
            let pruned = select_neighbors(&candidates, m, codec);
            graph.insert_neighbors(w, pruned.into_iter().map(|n| n.id).collect());
        } else {
            graph.insert_neighbors(w, std::mem::take(&mut neighbors));
        }
    }

    closest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FlatCodec;
    use crate::codec::VectorCodec as _;
    use crate::graph::DenseGraphCell;
    use crate::params::Metric;

    fn fixture(points: &[[f32; 2]], max_degree: usize) -> (DenseGraphCell, FlatCodec, NodeLocks) {
        let mut graph = DenseGraphCell::new(max_degree);
        graph.resize(points.len()).unwrap();
        let mut codec = FlatCodec::new(Metric::L2, 2);
        for p in points {
            codec.batch_insert(p);
        }
        (graph, codec, NodeLocks::new(points.len()))
    }

    fn heap_for(codec: &FlatCodec, query_id: InnerIdType, ids: &[InnerIdType]) -> BinaryHeap<Neighbor> {
        ids.iter()
            .map(|&id| Neighbor::new(codec.distance_by_id(query_id, id), id))
            .collect()
    }

    fn neighbors_of(graph: &DenseGraphCell, id: InnerIdType) -> Vec<InnerIdType> {
        let mut out = Vec::new();
        graph.get_neighbors(id, &mut out);
        out.sort_unstable();
        out
    }

    #[test]
    fn test_dominated_candidate_is_skipped() {
        // Node 0 at origin; 1 is close; 2 sits right behind 1 (dominated);
        // 3 is far off in another direction (kept).
        let points = [[0.0, 0.0], [1.0, 0.0], [1.5, 0.0], [0.0, 5.0]];
        let (graph, codec, locks) = fixture(&points, 4);
        let heap = heap_for(&codec, 0, &[1, 2, 3]);

        let closest = mutually_connect(0, heap, &graph, &codec, &locks);
        assert_eq!(closest, 1);
        // 2 is dominated: d(2, 0) = 2.25 > d(2, 1) = 0.25
        assert_eq!(neighbors_of(&graph, 0), vec![1, 3]);
    }

    #[test]
    fn test_links_are_bidirectional() {
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let (graph, codec, locks) = fixture(&points, 4);
        let heap = heap_for(&codec, 0, &[1, 2]);
        mutually_connect(0, heap, &graph, &codec, &locks);

        for n in neighbors_of(&graph, 0) {
            assert!(
                neighbors_of(&graph, n).contains(&0),
                "edge 0 -> {n} missing its reverse"
            );
        }
    }

    #[test]
    fn test_reciprocal_edge_triggers_reprune() {
        // max_degree 2; node 3 already has 2 neighbors, the new point pushes
        // it over cap and the list must shrink back to 2.
        let points = [[0.0, 0.1], [10.0, 0.0], [-10.0, 0.0], [0.0, 0.0]];
        let (graph, codec, locks) = fixture(&points, 2);
        graph.insert_neighbors(3, vec![1, 2]);
        graph.insert_neighbors(1, vec![3]);
        graph.insert_neighbors(2, vec![3]);

        let heap = heap_for(&codec, 0, &[3]);
        mutually_connect(0, heap, &graph, &codec, &locks);

        let pruned = neighbors_of(&graph, 3);
        assert!(pruned.len() <= 2);
        // the new, much closer point must survive the reprune
        assert!(pruned.contains(&0));
    }

    #[test]
    fn test_degree_cap_respected() {
        let points: Vec<[f32; 2]> = (0..8)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / 8.0;
                [angle.cos(), angle.sin()]
            })
            .chain(std::iter::once([0.0, 0.0]))
            .collect();
        let (graph, codec, locks) = fixture(&points, 3);
        let heap = heap_for(&codec, 8, &(0..8).collect::<Vec<_>>());
        mutually_connect(8, heap, &graph, &codec, &locks);
        assert!(neighbors_of(&graph, 8).len() <= 3);
    }

    #[test]
    fn test_empty_candidates_returns_self() {
        let points = [[0.0, 0.0]];
        let (graph, codec, locks) = fixture(&points, 2);
        let closest = mutually_connect(0, BinaryHeap::new(), &graph, &codec, &locks);
        assert_eq!(closest, 0);
        assert!(neighbors_of(&graph, 0).is_empty());
    }
}
