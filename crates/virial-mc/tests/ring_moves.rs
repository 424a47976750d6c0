use std::f64::consts::PI;

use virial_cluster::PairPotential;
use virial_core::{Boundary, Configuration, Molecule, RingSpring, RngHandle, Vec3};
use virial_mc::moves_ring::sample_free_ring;
use virial_mc::{propose, MoveContext, MoveKind};

#[derive(Debug)]
struct HardCore {
    diameter_sq: f64,
}

impl PairPotential for HardCore {
    fn energy(&self, r2: f64) -> f64 {
        if r2 < self.diameter_sq {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
struct Free;

impl PairPotential for Free {
    fn energy(&self, _r2: f64) -> f64 {
        0.0
    }
}

fn context(step: f64, spring: &RingSpring) -> MoveContext<'_> {
    MoveContext {
        step,
        beta: 1.0,
        spring: Some(spring),
        partial_trials: 4,
        regrow_bias: None,
    }
}

fn single_ring(spring: &RingSpring, rng: &mut RngHandle) -> Configuration {
    let beads = sample_free_ring(spring, rng);
    Configuration::from_molecules(vec![Molecule::ring(beads)], Boundary::Open).unwrap()
}

fn rg2(config: &Configuration) -> f64 {
    config.molecule(0).radius_of_gyration_sq()
}

/// Variance of the squared radius of gyration of a free ring, summed over
/// its normal modes.
fn free_ring_rg2_variance(spring: &RingSpring) -> f64 {
    let b = spring.beads() as f64;
    let k = spring.constant();
    let sum: f64 = (1..spring.beads())
        .map(|q| {
            let s = (PI * q as f64 / b).sin();
            (1.0 / (8.0 * k * s * s)).powi(2)
        })
        .sum();
    6.0 / (b * b) * sum
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

#[test]
fn bisection_reproduces_free_ring_statistics() {
    let spring = RingSpring::from_constant(8, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(11);
    let samples: Vec<f64> = (0..20_000)
        .map(|_| {
            let beads = sample_free_ring(&spring, &mut rng);
            assert_eq!(beads[0], Vec3::zeros());
            Molecule::ring(beads).radius_of_gyration_sq()
        })
        .collect();
    let (mean, var) = mean_and_variance(&samples);
    let expected_mean = spring.mean_radius_of_gyration_sq();
    let expected_var = free_ring_rg2_variance(&spring);
    assert!((mean / expected_mean - 1.0).abs() < 0.02, "mean {mean} vs {expected_mean}");
    assert!((var / expected_var - 1.0).abs() < 0.08, "variance {var} vs {expected_var}");
}

#[test]
fn full_regrowth_keeps_centroids() {
    let spring = RingSpring::from_constant(6, 2.0).unwrap();
    let mut rng = RngHandle::from_seed(3);
    let mut config = Configuration::new(3, 6, Boundary::Open).unwrap();
    config.translate_molecule(1, &Vec3::new(1.0, -2.0, 0.5));
    config.translate_molecule(2, &Vec3::new(-0.3, 0.4, 2.0));
    for _ in 0..50 {
        let record = propose(MoveKind::RingRegrowFull, &config, &context(0.0, &spring), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(record.log_bias, 0.0);
        for index in 0..3 {
            let moved = record.trial.centroid(index) - config.centroid(index);
            assert!(moved.norm() < 1e-12);
        }
        config = record.trial;
    }
    assert!(config.spring_sum() > 0.0);
}

#[test]
fn partial_regrowth_only_touches_the_arc() {
    let spring = RingSpring::from_constant(8, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(5);
    let config = single_ring(&spring, &mut rng);
    for _ in 0..100 {
        let record = propose(MoveKind::RingRegrowPartial, &config, &context(3.0, &spring), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(record.log_bias, 0.0);
        let changed = (0..8)
            .filter(|&b| record.trial.molecule(0).bead(b) != config.molecule(0).bead(b))
            .count();
        assert!(changed <= 3, "{changed} beads changed");
    }
}

#[test]
fn partial_regrowth_samples_the_free_ring() {
    let spring = RingSpring::from_constant(8, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(17);
    let mut config = single_ring(&spring, &mut rng);
    let ctx = context(3.0, &spring);
    let mut samples = Vec::with_capacity(200_000);
    for _ in 0..200_000 {
        // No cluster weight and an exact bridge: every proposal is accepted.
        if let Some(record) = propose(MoveKind::RingRegrowPartial, &config, &ctx, &mut rng).unwrap()
        {
            config = record.trial;
        }
        samples.push(rg2(&config));
    }
    let (mean, _) = mean_and_variance(&samples);
    let expected = spring.mean_radius_of_gyration_sq();
    assert!((mean / expected - 1.0).abs() < 0.05, "mean {mean} vs {expected}");
}

#[test]
fn scaling_with_partial_regrowth_samples_the_free_ring() {
    let spring = RingSpring::from_constant(8, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(23);
    let mut config = single_ring(&spring, &mut rng);
    let partial = context(3.0, &spring);
    let scale = context(0.6, &spring);
    let mut samples = Vec::with_capacity(200_000);
    for step in 0..200_000 {
        let (kind, ctx) = if step % 2 == 0 {
            (MoveKind::RingScale, &scale)
        } else {
            (MoveKind::RingRegrowPartial, &partial)
        };
        if let Some(record) = propose(kind, &config, ctx, &mut rng).unwrap() {
            if record.log_bias >= 0.0 || rng.uniform() < record.log_bias.exp() {
                config = record.trial;
            }
        }
        samples.push(rg2(&config));
    }
    let (mean, _) = mean_and_variance(&samples);
    let expected = spring.mean_radius_of_gyration_sq();
    assert!((mean / expected - 1.0).abs() < 0.05, "mean {mean} vs {expected}");
}

#[test]
fn scale_bias_matches_the_ring_weight_and_jacobian() {
    let spring = RingSpring::from_constant(6, 1.5).unwrap();
    let mut rng = RngHandle::from_seed(29);
    let config = single_ring(&spring, &mut rng);
    for _ in 0..20 {
        let record = propose(MoveKind::RingScale, &config, &context(0.4, &spring), &mut rng)
            .unwrap()
            .unwrap();
        let factor = (rg2(&record.trial) / rg2(&config)).sqrt();
        let old_sum = config.spring_sum();
        let new_sum = record.trial.spring_sum();
        let expected = -spring.constant() * (new_sum - old_sum) + 15.0 * factor.ln();
        assert!((record.log_bias - expected).abs() < 1e-9);
        let drift = record.trial.centroid(0) - config.centroid(0);
        assert!(drift.norm() < 1e-12);
    }
}

fn opposed_rings(beads: usize) -> Configuration {
    let ring = |phase: f64| {
        Molecule::ring(
            (0..beads)
                .map(|b| {
                    let angle = 2.0 * PI * b as f64 / beads as f64 + phase;
                    Vec3::new(angle.cos(), angle.sin(), 0.0)
                })
                .collect(),
        )
    };
    Configuration::from_molecules(vec![ring(0.0), ring(PI)], Boundary::Open).unwrap()
}

#[test]
fn biased_regrowth_never_places_beads_inside_a_hard_core() {
    let spring = RingSpring::from_constant(6, 1.0).unwrap();
    let core = HardCore { diameter_sq: 0.25 };
    let config = opposed_rings(6);
    let mut rng = RngHandle::from_seed(31);
    let ctx = MoveContext {
        regrow_bias: Some(&core),
        ..context(3.0, &spring)
    };
    let mut proposed = 0;
    for _ in 0..500 {
        let Some(record) = propose(MoveKind::RingRegrowPartial, &config, &ctx, &mut rng).unwrap()
        else {
            continue;
        };
        proposed += 1;
        assert!(record.log_bias.is_finite());
        for index in 0..2 {
            let other = 1 - index;
            for bead in 0..6 {
                let x = record.trial.molecule(index).bead(bead);
                if x != config.molecule(index).bead(bead) {
                    let y = record.trial.molecule(other).bead(bead);
                    assert!((x - y).norm_squared() >= 0.25);
                }
            }
        }
    }
    assert!(proposed > 0);
}

#[test]
fn flat_bias_leaves_the_proposal_unweighted() {
    let spring = RingSpring::from_constant(6, 1.0).unwrap();
    let config = opposed_rings(6);
    let mut rng = RngHandle::from_seed(37);
    let ctx = MoveContext {
        regrow_bias: Some(&Free),
        ..context(2.0, &spring)
    };
    for _ in 0..20 {
        let record = propose(MoveKind::RingRegrowPartial, &config, &ctx, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(record.log_bias, 0.0);
    }
}

#[test]
fn ring_moves_reject_point_molecules() {
    let spring = RingSpring::from_constant(4, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(1);
    let classical = Configuration::new(2, 1, Boundary::Open).unwrap();
    let err = propose(MoveKind::RingScale, &classical, &context(0.1, &spring), &mut rng)
        .unwrap_err();
    assert_eq!(err.info().code, "ring-move-classical");

    let rings = Configuration::new(2, 4, Boundary::Open).unwrap();
    let ctx = MoveContext {
        spring: None,
        ..context(0.1, &spring)
    };
    let err = propose(MoveKind::RingRegrowFull, &rings, &ctx, &mut rng).unwrap_err();
    assert_eq!(err.info().code, "missing-spring");
}

#[test]
fn rigid_moves_respect_the_anchor_and_ring_shape() {
    let spring = RingSpring::from_constant(5, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(41);
    let molecules = (0..3)
        .map(|_| Molecule::ring(sample_free_ring(&spring, &mut rng)))
        .collect();
    let config = Configuration::from_molecules(molecules, Boundary::Open).unwrap();
    let ctx = context(0.5, &spring);

    let moved = propose(MoveKind::Translate, &config, &ctx, &mut rng).unwrap().unwrap();
    assert_eq!(moved.trial.molecule(0), config.molecule(0));
    for index in 1..3 {
        let delta = moved.trial.centroid(index) - config.centroid(index);
        assert!(delta.iter().all(|c| c.abs() <= 0.5));
    }

    let turned = propose(MoveKind::Rotate, &config, &ctx, &mut rng).unwrap().unwrap();
    for index in 0..3 {
        assert!((turned.trial.centroid(index) - config.centroid(index)).norm() < 1e-12);
        let before = config.molecule(index).spring_sum();
        let after = turned.trial.molecule(index).spring_sum();
        assert!((before - after).abs() < 1e-9 * (1.0 + before));
    }
}
