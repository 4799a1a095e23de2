//! Property tests for the blob codec and the merge law.

use proptest::prelude::*;
use trialdb_core::{merge, BinaryMatrixCodec, MatrixCodec, SampleMatrix, SampleRow, FAILED_ROW};

// ============================================================================
// Strategies
// ============================================================================

/// A row of real measurements, or a failed attempt.
fn arb_row() -> impl Strategy<Value = SampleRow> {
    prop_oneof![
        4 => proptest::array::uniform8(0.0f64..1.0e6),
        1 => Just(FAILED_ROW),
    ]
}

/// Absent, or a matrix of 1..12 rows.
fn arb_matrix() -> impl Strategy<Value = Option<SampleMatrix>> {
    prop_oneof![
        1 => Just(None),
        4 => proptest::collection::vec(arb_row(), 1..12).prop_map(SampleMatrix::from_rows),
    ]
}

fn sorted_row_bits(m: &Option<SampleMatrix>) -> Vec<[u64; 8]> {
    let mut rows: Vec<[u64; 8]> = m
        .iter()
        .flat_map(|m| m.rows().iter())
        .map(|row| row.map(f64::to_bits))
        .collect();
    rows.sort_unstable();
    rows
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// decode(encode(m)) == m, including the absent case.
    #[test]
    fn prop_codec_roundtrip(m in arb_matrix()) {
        let codec = BinaryMatrixCodec;
        let bytes = codec.encode_optional(m.as_ref());
        let decoded = codec.decode_optional(bytes.as_deref()).unwrap();
        prop_assert_eq!(decoded, m);
    }

    /// Raw bit patterns survive, not only numeric values.
    #[test]
    fn prop_codec_preserves_bits(bits in proptest::collection::vec(any::<u64>(), 8)) {
        let mut row = [0.0; 8];
        for (dst, b) in row.iter_mut().zip(&bits) {
            *dst = f64::from_bits(*b);
        }
        let m = SampleMatrix::from_rows(vec![row]).unwrap();
        let decoded = BinaryMatrixCodec.decode(&BinaryMatrixCodec.encode(&m)).unwrap();
        prop_assert_eq!(decoded, m);
    }

    #[test]
    fn prop_merge_identity(m in arb_matrix()) {
        prop_assert_eq!(merge(None, m.clone()), m.clone());
        prop_assert_eq!(merge(m.clone(), None), m);
    }

    #[test]
    fn prop_merge_row_count_adds(a in arb_matrix(), b in arb_matrix()) {
        let rows = |m: &Option<SampleMatrix>| m.as_ref().map_or(0, SampleMatrix::row_count);
        let expected = rows(&a) + rows(&b);
        prop_assert_eq!(rows(&merge(a, b)), expected);
    }

    /// Both groupings hold the same multiset of rows.
    #[test]
    fn prop_merge_content_associative(a in arb_matrix(), b in arb_matrix(), c in arb_matrix()) {
        let left = merge(merge(a.clone(), b.clone()), c.clone());
        let right = merge(a, merge(b, c));
        prop_assert_eq!(sorted_row_bits(&left), sorted_row_bits(&right));
    }
}
