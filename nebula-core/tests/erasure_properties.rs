//! Property and interoperability tests for the GF(256) Reed-Solomon codec
//!
//! - any k of n shards reproduce the object exactly
//! - the fast path and the matrix path agree
//! - shards are bit-compatible with `reed-solomon-erasure` (galois_8)
//!
//! Run with: cargo test --test erasure_properties

use nebula_core::erasure::{ErasureCodec, ShardData};
use nebula_core::gf256;
use proptest::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::collections::BTreeMap;

fn subset(shards: &[ShardData], keep: &[usize]) -> BTreeMap<usize, Vec<u8>> {
    keep.iter().map(|&i| (i, shards[i].data.to_vec())).collect()
}

fn borrow(map: &BTreeMap<usize, Vec<u8>>) -> BTreeMap<usize, &[u8]> {
    map.iter().map(|(&i, v)| (i, v.as_slice())).collect()
}

/// (k, m, a k-subset of 0..k+m)
fn code_and_subset() -> impl Strategy<Value = (usize, usize, Vec<usize>)> {
    (1usize..=8, 0usize..=6).prop_flat_map(|(k, m)| {
        let indices: Vec<usize> = (0..k + m).collect();
        (Just(k), Just(m), prop::sample::subsequence(indices, k))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn decode_any_k_subset_recovers_object(
        (k, m, keep) in code_and_subset(),
        data in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let codec = ErasureCodec::with_shards(k, m).unwrap();
        let shards = codec.encode(&data);
        prop_assert_eq!(shards.len(), k + m);

        let available = subset(&shards, &keep);
        let decoded = codec.decode(&borrow(&available), data.len()).unwrap();
        prop_assert_eq!(decoded.data.as_ref(), data.as_slice());
        prop_assert_eq!(decoded.shards_used, keep);
    }

    #[test]
    fn fast_path_matches_matrix_path(
        k in 1usize..=10,
        m in 0usize..=4,
        data in prop::collection::vec(any::<u8>(), 1..4096),
    ) {
        let codec = ErasureCodec::with_shards(k, m).unwrap();
        let shards = codec.encode(&data);
        let all: Vec<usize> = (0..k + m).collect();
        let available = subset(&shards, &all);

        let fast = codec.decode(&borrow(&available), data.len()).unwrap();
        let general = codec.decode_with_matrix(&borrow(&available), data.len()).unwrap();
        prop_assert!(fast.fast_path);
        prop_assert!(!general.fast_path);
        prop_assert_eq!(fast.data, general.data);
    }

    #[test]
    fn parallel_encode_matches_sequential(
        k in 1usize..=12,
        m in 0usize..=6,
        data in prop::collection::vec(any::<u8>(), 0..8192),
    ) {
        let codec = ErasureCodec::with_shards(k, m).unwrap();
        prop_assert_eq!(codec.encode(&data), codec.encode_parallel(&data));
    }

    #[test]
    fn field_division_inverts_multiplication(a in any::<u8>(), b in 1u8..=255) {
        prop_assert_eq!(gf256::div(gf256::mul(a, b), b).unwrap(), a);
        prop_assert_eq!(gf256::mul(a, b), gf256::mul(b, a));
    }

    #[test]
    fn field_multiplication_distributes(a in any::<u8>(), b in any::<u8>(), c in any::<u8>()) {
        prop_assert_eq!(
            gf256::mul(a, gf256::add(b, c)),
            gf256::add(gf256::mul(a, b), gf256::mul(a, c))
        );
    }
}

#[test]
fn test_parity_matches_reference_codec() {
    for (k, m) in [(1, 1), (3, 2), (4, 4), (10, 4), (17, 3)] {
        let data: Vec<u8> = (0..k * 97).map(|i| (i * 31 % 251) as u8).collect();
        let ours = ErasureCodec::with_shards(k, m).unwrap().encode(&data);

        let reference = ReedSolomon::new(k, m).unwrap();
        let mut theirs: Vec<Vec<u8>> = ours[..k].iter().map(|s| s.data.to_vec()).collect();
        theirs.extend((0..m).map(|_| vec![0u8; ours[0].size()]));
        reference.encode(&mut theirs).unwrap();

        for (a, b) in ours.iter().zip(&theirs) {
            assert_eq!(a.data.as_ref(), b.as_slice(), "k={k} m={m} shard {}", a.index);
        }
    }
}

#[test]
fn test_decode_reference_shards() {
    let (k, m) = (5, 3);
    let data: Vec<u8> = (0..5 * 1000).map(|i| (i % 253) as u8).collect();

    let reference = ReedSolomon::new(k, m).unwrap();
    let mut shards: Vec<Vec<u8>> = data.chunks(1000).map(|c| c.to_vec()).collect();
    shards.extend((0..m).map(|_| vec![0u8; 1000]));
    reference.encode(&mut shards).unwrap();

    // lose three data shards, decode from two data and three parity
    let codec = ErasureCodec::with_shards(k, m).unwrap();
    let available: BTreeMap<usize, &[u8]> = [1, 3, 5, 6, 7]
        .iter()
        .map(|&i| (i, shards[i].as_slice()))
        .collect();
    let decoded = codec.decode(&available, data.len()).unwrap();
    assert_eq!(decoded.data.as_ref(), data.as_slice());
}

#[test]
fn test_reference_reconstructs_our_shards() {
    let (k, m) = (4, 2);
    let data = b"shards written here, recovered by the reference codec".to_vec();
    let ours = ErasureCodec::with_shards(k, m).unwrap().encode(&data);

    let mut partial: Vec<Option<Vec<u8>>> = ours.iter().map(|s| Some(s.data.to_vec())).collect();
    partial[0] = None;
    partial[2] = None;

    ReedSolomon::new(k, m).unwrap().reconstruct_data(&mut partial).unwrap();
    let mut recovered: Vec<u8> = partial[..k].iter().flatten().flatten().copied().collect();
    recovered.truncate(data.len());
    assert_eq!(recovered, data);
}
