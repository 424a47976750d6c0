use std::f64::consts::PI;
use std::sync::Arc;

use virial_cluster::graphs::virial_cluster;
use virial_cluster::hard_sphere;
use virial_cluster::{ClusterValue, HardSphere, LennardJones, PotentialMayer};
use virial_mc::{RunConfig, Simulation, VirialSystem};

const TEMPERATURE: f64 = 2.0;

fn lj_energy(r: f64) -> f64 {
    let s6 = r.powi(-6);
    4.0 * (s6 * s6 - s6)
}

fn lj_mayer(r: f64, beta: f64) -> f64 {
    if r == 0.0 {
        return -1.0;
    }
    (-beta * lj_energy(r)).exp_m1()
}

fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, intervals: usize) -> f64 {
    let n = intervals + intervals % 2;
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + i as f64 * h);
    }
    sum * h / 3.0
}

fn lj_system() -> VirialSystem {
    let target: ClusterValue = virial_cluster(
        2,
        Arc::new(PotentialMayer::new(LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
        })),
    )
    .unwrap()
    .into();
    let reference: ClusterValue = virial_cluster(2, Arc::new(HardSphere::new(1.5))).unwrap().into();
    VirialSystem::new(reference, target, hard_sphere::b2(1.5)).unwrap()
}

fn lj_config(steps: u64, seed: u64) -> RunConfig {
    let mut config = RunConfig::default();
    config.steps = steps;
    config.temperature = TEMPERATURE;
    config.seed_policy.master_seed = seed;
    config
}

#[test]
fn target_distance_histogram_follows_the_mayer_function() {
    let beta = 1.0 / TEMPERATURE;
    let mut config = lj_config(1_000_000, 43);
    config.histogram.enabled = true;
    config.histogram.bins = 50;
    config.histogram.max_distance = 5.0;

    let mut simulation = Simulation::new(&config, lj_system()).unwrap();
    let result = simulation.run_production().unwrap();

    // B2 = -2 pi int f r^2 dr; past r = 30 only the r^-6 tail remains.
    let integral = simpson(|r| lj_mayer(r, beta) * r * r, 0.0, 30.0, 300_000)
        + 4.0 * beta / (3.0 * 30f64.powi(3));
    let exact_b2 = -2.0 * PI * integral;
    let tolerance = (5.0 * result.value_error).max(0.03 * exact_b2.abs());
    assert!(
        (result.value - exact_b2).abs() < tolerance,
        "B2 {} +/- {} vs {}",
        result.value,
        result.value_error,
        exact_b2
    );

    let histogram = simulation.controller().histogram().unwrap();
    let in_range = (histogram.total() - histogram.overflow()) as f64;
    assert!(in_range > 0.0);
    let scale = histogram.total() as f64 / in_range;
    let bins = histogram.bins();
    let weight = |r: f64| lj_mayer(r, beta).abs() * r * r;
    let norm = simpson(weight, 0.0, 5.0, 100_000);
    for window in 0..10 {
        let (lo, hi) = (0.5 * window as f64, 0.5 * (window + 1) as f64);
        let expected = simpson(weight, lo, hi, 10_000) / norm;
        let observed: f64 = bins[window * 5..(window + 1) * 5]
            .iter()
            .map(|bin| bin.density * 0.1 * scale)
            .sum();
        assert!(
            (observed - expected).abs() < 0.04,
            "window [{lo}, {hi}): observed {observed} expected {expected}"
        );
    }
}

#[test]
fn derivatives_and_observables_ride_on_the_target() {
    let beta = 1.0 / TEMPERATURE;
    let mut config = lj_config(200_000, 47);
    config.derivative_order = 1;
    let target_copy = virial_cluster(
        2,
        Arc::new(PotentialMayer::new(LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
        })),
    )
    .unwrap()
    .into();
    let system = lj_system().with_observable("copy", target_copy);

    let mut simulation = Simulation::new(&config, system).unwrap();
    assert_eq!(
        simulation.controller().observable_labels(),
        vec!["copy".to_string(), "beta-derivative-1".to_string()]
    );
    let result = simulation.run_production().unwrap();

    let labels: Vec<&str> = result.observables.keys().map(String::as_str).collect();
    assert_eq!(labels, ["copy", "beta-derivative-1"]);

    let copy = result.observables["copy"];
    assert!((copy.ratio - result.ratio).abs() <= 1e-12 * result.ratio.abs());
    assert!((copy.value - result.value).abs() <= 1e-12 * result.value.abs());

    // dB2/dbeta = 2 pi int u exp(-beta u) r^2 dr.
    let exact = 2.0
        * PI
        * simpson(
            |r| {
                if r == 0.0 {
                    0.0
                } else {
                    let u = lj_energy(r);
                    u * (-beta * u).exp() * r * r
                }
            },
            0.0,
            30.0,
            300_000,
        );
    let derivative = result.observables["beta-derivative-1"];
    assert!(derivative.value.is_finite() && derivative.value_error.is_finite());
    let tolerance = (5.0 * derivative.value_error).max(0.05 * exact.abs());
    assert!(
        (derivative.value - exact).abs() < tolerance,
        "dB2/dbeta {} +/- {} vs {}",
        derivative.value,
        derivative.value_error,
        exact
    );
}
