use proptest::prelude::*;

use virial_mc::BlockAccumulator;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + a.abs() + b.abs())
}

fn filled(samples: &[(f64, f64)], block_size: u64) -> BlockAccumulator {
    let mut acc = BlockAccumulator::new(2, block_size).unwrap();
    for &(x, y) in samples {
        acc.push(&[x, y]).unwrap();
    }
    acc
}

#[test]
fn block_statistics_of_a_short_series() {
    let mut acc = BlockAccumulator::new(1, 2).unwrap();
    for x in [1.0, 3.0, 5.0, 7.0] {
        acc.push(&[x]).unwrap();
    }
    assert_eq!(acc.samples(), 4);
    assert_eq!(acc.blocks(), 2);
    assert_eq!(acc.mean(), vec![4.0]);
    assert_eq!(acc.block_mean(), vec![4.0]);
    // Block means 2 and 6.
    assert_eq!(acc.covariance(), vec![vec![8.0]]);
    assert_eq!(acc.mean_covariance(), vec![vec![4.0]]);
    assert_eq!(acc.std_error(), vec![2.0]);
}

#[test]
fn incomplete_block_counts_toward_mean_only() {
    let mut acc = BlockAccumulator::new(1, 2).unwrap();
    for x in [1.0, 3.0, 8.0] {
        acc.push(&[x]).unwrap();
    }
    assert_eq!(acc.blocks(), 1);
    assert_eq!(acc.mean(), vec![4.0]);
    assert_eq!(acc.block_mean(), vec![2.0]);
    assert!(acc.covariance()[0][0].is_nan());
}

#[test]
fn correlation_handles_constant_components() {
    let mut acc = BlockAccumulator::new(3, 1).unwrap();
    for x in [1.0, 2.0, 4.0, 7.0] {
        acc.push(&[x, 2.0 * x + 1.0, 5.0]).unwrap();
    }
    let corr = acc.correlation();
    assert!(close(corr[0][1], 1.0));
    assert!(close(corr[1][0], 1.0));
    assert_eq!(corr[0][2], 0.0);
    assert_eq!(corr[2][2], 0.0);
}

#[test]
fn lag_one_correlation_of_alternating_blocks() {
    let mut acc = BlockAccumulator::new(1, 1).unwrap();
    for x in [1.0, -1.0, 1.0, -1.0] {
        acc.push(&[x]).unwrap();
    }
    let rho = acc.block_correlation()[0];
    assert!(close(rho, -0.75), "rho = {rho}");

    let mut short = BlockAccumulator::new(1, 1).unwrap();
    short.push(&[1.0]).unwrap();
    short.push(&[2.0]).unwrap();
    assert!(short.block_correlation()[0].is_nan());
}

#[test]
fn proportional_columns_have_an_exact_ratio() {
    let mut acc = BlockAccumulator::new(2, 3).unwrap();
    for i in 0..30 {
        let b = 1.0 + (i as f64 * 0.7).sin().abs();
        acc.push(&[2.0 * b, b]).unwrap();
    }
    let (ratio, error) = acc.ratio_error(0, 1);
    assert!(close(ratio, 2.0));
    assert!(error < 1e-6, "error = {error}");
}

#[test]
fn dimension_mismatches_are_rejected() {
    let mut acc = BlockAccumulator::new(2, 4).unwrap();
    let err = acc.push(&[1.0]).unwrap_err();
    assert_eq!(err.info().code, "sample-dimension");

    let other = BlockAccumulator::new(2, 5).unwrap();
    let err = acc.merge(&other).unwrap_err();
    assert_eq!(err.info().code, "accumulator-merge");

    assert!(BlockAccumulator::new(0, 4).is_err());
    assert!(BlockAccumulator::new(2, 0).is_err());
}

#[test]
fn trailing_partial_blocks_pool_on_merge() {
    let mut a = BlockAccumulator::new(1, 2).unwrap();
    a.push(&[1.0]).unwrap();
    let mut b = BlockAccumulator::new(1, 2).unwrap();
    b.push(&[3.0]).unwrap();
    a.merge(&b).unwrap();
    assert_eq!(a.samples(), 2);
    assert_eq!(a.blocks(), 1);
    assert_eq!(a.block_mean(), vec![2.0]);
}

#[test]
fn pooled_overflow_closes_one_full_block() {
    let mut a = BlockAccumulator::new(1, 3).unwrap();
    a.push(&[1.0]).unwrap();
    a.push(&[1.0]).unwrap();
    let mut b = BlockAccumulator::new(1, 3).unwrap();
    b.push(&[4.0]).unwrap();
    b.push(&[4.0]).unwrap();
    a.merge(&b).unwrap();
    assert_eq!(a.samples(), 4);
    assert_eq!(a.blocks(), 1);
    assert!(close(a.block_mean()[0], 2.5));
    assert!(close(a.mean()[0], 2.5));

    // One pooled sample was carried over; two more complete the next block.
    a.push(&[2.5]).unwrap();
    assert_eq!(a.blocks(), 1);
    a.push(&[2.5]).unwrap();
    assert_eq!(a.blocks(), 2);
    assert!(close(a.block_mean()[0], 2.5));
}

#[test]
fn reset_discards_everything() {
    let mut acc = filled(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)], 1);
    acc.reset();
    assert_eq!(acc.samples(), 0);
    assert_eq!(acc.blocks(), 0);
    assert!(acc.mean()[0].is_nan());
    acc.push(&[2.0, 2.0]).unwrap();
    assert_eq!(acc.mean(), vec![2.0, 2.0]);
}

proptest! {
    #[test]
    fn merge_matches_a_single_pass(
        data in prop::collection::vec((-10.0f64..10.0, -10.0f64..10.0), 24),
        split in 0usize..=8,
    ) {
        let block = 3u64;
        let cut = split * block as usize;
        let whole = filled(&data, block);
        let mut merged = filled(&data[..cut], block);
        merged.merge(&filled(&data[cut..], block)).unwrap();

        prop_assert_eq!(merged.samples(), whole.samples());
        prop_assert_eq!(merged.blocks(), whole.blocks());
        for (a, b) in merged.mean().iter().zip(whole.mean()) {
            prop_assert!(close(*a, b));
        }
        for (a, b) in merged.block_mean().iter().zip(whole.block_mean()) {
            prop_assert!(close(*a, b));
        }
        for (row_a, row_b) in merged.covariance().iter().zip(whole.covariance()) {
            for (a, b) in row_a.iter().zip(row_b) {
                prop_assert!(close(*a, b));
            }
        }
        for (a, b) in merged.block_correlation().iter().zip(whole.block_correlation()) {
            prop_assert!(close(*a, b), "{} vs {}", a, b);
        }
    }
}
