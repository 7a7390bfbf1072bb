//! Property-based tests for the partitioned softmax.
//!
//! Invariants:
//! - every row sums to ≈1.0 and every element lies in [0, 1]
//! - shifting a row by a constant leaves its output unchanged
//! - a clearly larger input element gets a strictly larger probability
//! - splitting rows across more units changes nothing
//! - every acquired slot is released

use proptest::prelude::*;
use staged_softmax::{launch, RunReport, SoftmaxConfig};

// ── helpers ───────────────────────────────────────────────────────────────

/// `(rows, width, units, tile_factor, buffer_depth)` that always plan.
fn shapes() -> impl Strategy<Value = (usize, usize, usize, usize, usize)> {
    (1usize..=4, 1usize..=4, 1usize..=3, 1usize..=4, 1usize..=2).prop_map(
        |(units, rows_per_unit, tile_factor, tile_len, depth)| {
            (units * rows_per_unit, tile_factor * depth * tile_len, units, tile_factor, depth)
        },
    )
}

fn matrix() -> impl Strategy<Value = (usize, usize, usize, usize, usize, Vec<f32>)> {
    shapes().prop_flat_map(|(rows, width, units, tf, depth)| {
        prop::collection::vec(-20.0f32..20.0, rows * width)
            .prop_map(move |data| (rows, width, units, tf, depth, data))
    })
}

fn softmax(rows: usize, width: usize, units: usize, tf: usize, depth: usize, src: &[f32]) -> (Vec<f32>, RunReport) {
    let plan = SoftmaxConfig::default()
        .with_shape(rows, width)
        .with_units(units)
        .with_tile_factor(tf)
        .with_buffer_depth(depth)
        .plan()
        .expect("strategy only builds valid shapes");
    let mut dst = vec![0.0f32; src.len()];
    let report = launch(&plan, src, &mut dst).expect("launch");
    (dst, report)
}

// ── distribution invariants ───────────────────────────────────────────────

proptest! {
    #[test]
    fn rows_sum_to_one((rows, width, units, tf, depth, src) in matrix()) {
        let (out, report) = softmax(rows, width, units, tf, depth, &src);
        prop_assert!(report.degenerate_rows.is_empty());
        for row in out.chunks_exact(width) {
            let total: f32 = row.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-5, "row sum = {total}");
        }
    }

    #[test]
    fn outputs_are_probabilities((rows, width, units, tf, depth, src) in matrix()) {
        let (out, _) = softmax(rows, width, units, tf, depth, &src);
        for &p in &out {
            prop_assert!((0.0..=1.0).contains(&p), "probability {p} out of range");
        }
    }

    #[test]
    fn no_slot_leaks((rows, width, units, tf, depth, src) in matrix()) {
        let (_, report) = softmax(rows, width, units, tf, depth, &src);
        prop_assert!(report.is_balanced(), "{report:?}");
        prop_assert_eq!(report.units, units);
    }
}

// ── shift invariance and order ────────────────────────────────────────────

proptest! {
    /// Shifts are small integers so `x + c` stays exact in f32.
    #[test]
    fn shift_invariant(
        data in prop::collection::vec(-8i32..8, 8),
        shift in -50i32..50,
    ) {
        let src: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        let shifted: Vec<f32> = data.iter().map(|&v| (v + shift) as f32).collect();
        let (a, _) = softmax(1, 8, 1, 2, 2, &src);
        let (b, _) = softmax(1, 8, 1, 2, 2, &shifted);
        for (x, y) in a.iter().zip(&b) {
            prop_assert!((x - y).abs() < 1e-6, "{x} vs {y}");
        }
    }

    #[test]
    fn larger_input_gets_larger_probability(data in prop::collection::vec(-10.0f32..10.0, 8)) {
        let (out, _) = softmax(1, 8, 1, 2, 2, &data);
        for i in 0..8 {
            for j in 0..8 {
                let gap = data[i] - data[j];
                if gap > 1e-3 {
                    prop_assert!(out[i] > out[j], "x[{i}]={} > x[{j}]={} but p {} <= {}", data[i], data[j], out[i], out[j]);
                } else if gap > 0.0 {
                    // Near-ties may round to the same probability.
                    prop_assert!(out[i] >= out[j], "x[{i}]={} > x[{j}]={} but p {} < {}", data[i], data[j], out[i], out[j]);
                }
            }
        }
    }
}

// ── partition independence ────────────────────────────────────────────────

proptest! {
    #[test]
    fn unit_count_does_not_change_output(data in prop::collection::vec(-10.0f32..10.0, 8 * 16)) {
        let (single, _) = softmax(8, 16, 1, 2, 2, &data);
        for units in [2, 4, 8] {
            let (split, _) = softmax(8, 16, units, 2, 2, &data);
            prop_assert_eq!(&split, &single);
        }
    }
}
