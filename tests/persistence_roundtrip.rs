//! File-backed persistence: round trips, the empty-index marker, and
//! corruption handling.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hgraph::{Dataset, HGraph, HGraphError, HGraphParams, SearchParams};

fn params(dim: usize) -> HGraphParams {
    HGraphParams {
        dim,
        max_degree: 16,
        ef_construction: 100,
        ..HGraphParams::default()
    }
}

fn build_index(n: usize, dim: usize, p: &HGraphParams) -> (HGraph, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(9);
    let vectors: Vec<f32> = (0..n * dim).map(|_| rng.gen::<f32>()).collect();
    let labels: Vec<i64> = (0..n as i64).collect();
    let index = HGraph::new(p).unwrap();
    index.build(&Dataset::new(&labels, &vectors)).unwrap();
    (index, vectors)
}

#[test]
fn file_roundtrip_preserves_answers() {
    let (n, dim) = (400, 8);
    let p = params(dim);
    let (index, vectors) = build_index(n, dim, &p);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.hgraph");
    let mut file = File::create(&path).unwrap();
    index.serialize(&mut file).unwrap();
    file.sync_all().unwrap();

    let restored = HGraph::new(&p).unwrap();
    let mut file = File::open(&path).unwrap();
    restored.deserialize(&mut file).unwrap();

    assert_eq!(restored.num_elements(), n);
    restored.validate().unwrap();
    for i in (0..n).step_by(37) {
        let query = &vectors[i * dim..(i + 1) * dim];
        let a = index
            .knn_search(query, 5, &SearchParams::default(), None)
            .unwrap();
        let b = restored
            .knn_search(query, 5, &SearchParams::default(), None)
            .unwrap();
        assert_eq!(a.labels, b.labels);
    }
}

#[test]
fn empty_index_roundtrips_through_marker() {
    let p = params(4);
    let index = HGraph::new(&p).unwrap();
    let mut bytes = Vec::new();
    index.serialize(&mut bytes).unwrap();
    assert_eq!(bytes, b"EMPTY_HGRAPH");

    let restored = HGraph::new(&p).unwrap();
    restored.deserialize(&mut bytes.as_slice()).unwrap();
    assert!(restored.is_empty());
}

#[test]
fn deserialize_into_nonempty_index_is_rejected() {
    let dim = 8;
    let p = params(dim);
    let (index, _) = build_index(50, dim, &p);
    let mut bytes = Vec::new();
    index.serialize(&mut bytes).unwrap();

    let (target, _) = build_index(10, dim, &p);
    let err = target.deserialize(&mut bytes.as_slice()).unwrap_err();
    assert!(matches!(err, HGraphError::IndexNotEmpty));
    // the populated target is untouched
    assert_eq!(target.num_elements(), 10);
}

#[test]
fn truncated_payload_is_a_read_error() {
    let p = params(8);
    let (index, _) = build_index(100, 8, &p);
    let mut bytes = Vec::new();
    index.serialize(&mut bytes).unwrap();
    bytes.truncate(bytes.len() / 2);

    let restored = HGraph::new(&p).unwrap();
    let err = restored.deserialize(&mut bytes.as_slice()).unwrap_err();
    assert!(matches!(err, HGraphError::ReadError(_)), "got {err:?}");
    // a failed restore leaves the index empty and usable
    assert!(restored.is_empty());
}

#[test]
fn corrupted_header_is_a_read_error() {
    let p = params(8);
    let (index, _) = build_index(100, 8, &p);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.hgraph");
    let mut file = File::create(&path).unwrap();
    index.serialize(&mut file).unwrap();

    // flip a byte inside the dim field
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    file.seek(SeekFrom::Start(3)).unwrap();
    let mut b = [0u8; 1];
    file.read_exact(&mut b).unwrap();
    file.seek(SeekFrom::Start(3)).unwrap();
    file.write_all(&[b[0] ^ 0xFF]).unwrap();

    let restored = HGraph::new(&p).unwrap();
    let mut file = File::open(&path).unwrap();
    let err = restored.deserialize(&mut file).unwrap_err();
    assert!(matches!(err, HGraphError::ReadError(_)), "got {err:?}");
}

#[test]
fn parameter_mismatch_is_a_read_error() {
    let p = params(8);
    let (index, _) = build_index(50, 8, &p);
    let mut bytes = Vec::new();
    index.serialize(&mut bytes).unwrap();

    // different ef_construction than the serialized index
    let other = HGraphParams {
        ef_construction: 77,
        ..p
    };
    let restored = HGraph::new(&other).unwrap();
    let err = restored.deserialize(&mut bytes.as_slice()).unwrap_err();
    assert!(matches!(err, HGraphError::ReadError(_)), "got {err:?}");
}

#[test]
fn extra_info_survives_roundtrip() {
    let dim = 4;
    let p = HGraphParams {
        dim,
        max_degree: 8,
        ef_construction: 50,
        extra_info_size: 2,
        ..HGraphParams::default()
    };
    let labels = [7i64, 8, 9];
    let vectors = [
        0.0, 0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0,
    ];
    let index = HGraph::new(&p).unwrap();
    index
        .add(&Dataset::new(&labels, &vectors).with_extra_info(b"aabbcc"))
        .unwrap();

    let mut bytes = Vec::new();
    index.serialize(&mut bytes).unwrap();
    let restored = HGraph::new(&p).unwrap();
    restored.deserialize(&mut bytes.as_slice()).unwrap();

    let out = restored
        .knn_search(&[1.0, 0.0, 0.0, 0.0], 1, &SearchParams::default(), None)
        .unwrap();
    assert_eq!(out.labels, vec![8]);
    assert_eq!(out.extra_info.as_deref(), Some(&b"bb"[..]));
}

#[test]
fn distance_by_id_consistent_after_restore() {
    let p = HGraphParams {
        use_reorder: true,
        ..params(4)
    };
    let index = HGraph::new(&p).unwrap();
    index
        .add(&Dataset::new(&[1, 2], &[0.0, 0.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0]))
        .unwrap();

    let mut bytes = Vec::new();
    index.serialize(&mut bytes).unwrap();
    let restored = HGraph::new(&p).unwrap();
    restored.deserialize(&mut bytes.as_slice()).unwrap();

    let d_orig = index.calculate_distance_by_id(&[0.0; 4], 2).unwrap();
    let d_restored = restored.calculate_distance_by_id(&[0.0; 4], 2).unwrap();
    assert_eq!(d_orig.to_bits(), d_restored.to_bits());
    assert!((d_orig - 25.0).abs() < 1e-5);

    assert!(matches!(
        restored.calculate_distance_by_id(&[0.0; 4], 99),
        Err(HGraphError::InvalidArgument(_))
    ));
}
