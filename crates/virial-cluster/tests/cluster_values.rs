use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use virial_cluster::graphs::virial_cluster;
use virial_cluster::{
    AxilrodTeller, Bond, BondColor, BondFunctions, ClusterSum, ClusterValue, Coefficient, Diagram,
    HardSphere, LennardJones, MayerFunction, PairGeometry, PotentialMayer, RingAveraged,
    RingExchange, SquareWell,
};
use virial_core::{Boundary, Configuration, Molecule, RingSpring, Vec3};

fn points(positions: &[[f64; 3]]) -> Configuration {
    let molecules = positions
        .iter()
        .map(|p| Molecule::point(Vec3::new(p[0], p[1], p[2])))
        .collect();
    Configuration::from_molecules(molecules, Boundary::Open).unwrap()
}

fn random_points(rng: &mut StdRng, n: usize, spread: f64) -> Configuration {
    let positions: Vec<[f64; 3]> = (0..n)
        .map(|_| {
            [
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
            ]
        })
        .collect();
    points(&positions)
}

fn lj() -> LennardJones {
    LennardJones {
        epsilon: 1.0,
        sigma: 1.0,
    }
}

#[test]
fn hard_sphere_b2_is_half_inside_and_zero_outside() {
    let cluster = virial_cluster(2, Arc::new(HardSphere::new(1.0))).unwrap();
    let inside = points(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]]);
    let outside = points(&[[0.0, 0.0, 0.0], [1.5, 0.0, 0.0]]);
    assert_eq!(cluster.value(&inside, 1.0), 0.5);
    assert_eq!(cluster.value(&outside, 1.0), 0.0);
}

#[test]
fn hard_sphere_b3_counts_the_triangle() {
    let cluster = virial_cluster(3, Arc::new(HardSphere::new(1.0))).unwrap();
    let triangle = points(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]]);
    // -1/3 * (-1)^3
    assert!((cluster.value(&triangle, 1.0) - 1.0 / 3.0).abs() < 1e-15);
    let open_chain = points(&[[0.0, 0.0, 0.0], [0.9, 0.0, 0.0], [1.8, 0.0, 0.0]]);
    assert_eq!(cluster.value(&open_chain, 1.0), 0.0);
}

#[test]
fn terms_sum_to_value() {
    let cluster = virial_cluster(4, Arc::new(PotentialMayer::new(lj()))).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        let config = random_points(&mut rng, 4, 1.2);
        let terms = cluster.terms(&config, 0.8);
        assert_eq!(terms.len(), 10);
        let total: f64 = terms.iter().sum();
        let value = cluster.value(&config, 0.8);
        assert!((total - value).abs() <= 1e-12 * value.abs().max(1.0));
    }
}

#[test]
fn difference_cluster_matches_separate_subtraction() {
    let full = ClusterValue::from(virial_cluster(3, Arc::new(PotentialMayer::new(lj()))).unwrap());
    let approx = ClusterValue::from(
        virial_cluster(
            3,
            Arc::new(PotentialMayer::new(SquareWell {
                sigma: 1.0,
                lambda: 1.5,
                epsilon: 0.7,
            })),
        )
        .unwrap(),
    );
    let difference = ClusterValue::difference(full.clone(), vec![approx.clone()]).unwrap();

    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..100 {
        let config = random_points(&mut rng, 3, 1.5);
        let separate = full.value(&config, 1.3) - approx.value(&config, 1.3);
        assert_eq!(difference.value(&config, 1.3), separate);
    }
    assert_eq!(difference.diagram_count(), 2);
}

#[test]
fn difference_parts_must_span_the_same_points() {
    let b2 = ClusterValue::from(virial_cluster(2, Arc::new(HardSphere::new(1.0))).unwrap());
    let b3 = ClusterValue::from(virial_cluster(3, Arc::new(HardSphere::new(1.0))).unwrap());
    let err = ClusterValue::difference(b3, vec![b2]).unwrap_err();
    assert_eq!(err.info().code, "difference-size");
}

#[test]
fn non_additive_diagrams_need_a_three_body_function() {
    let diagram = Diagram::new(
        vec![Bond::pair(0, 1), Bond::triple(0, 1, 2)],
        Coefficient::new(-1, 3).unwrap(),
    );
    let bonds = BondFunctions::new(Arc::new(PotentialMayer::new(lj())));
    let err = ClusterSum::new(3, vec![diagram.clone()], bonds.clone()).unwrap_err();
    assert_eq!(err.info().code, "missing-multibody");

    let cluster = ClusterSum::new(
        3,
        vec![diagram],
        bonds.with_triple(Arc::new(AxilrodTeller { nu: 1.0 })),
    )
    .unwrap();
    assert!(ClusterValue::from(cluster).has_triples());
}

#[test]
fn bonds_must_reference_existing_molecules() {
    let diagram = Diagram::new(vec![Bond::pair(0, 3)], Coefficient::integer(1));
    let err = ClusterSum::new(
        3,
        vec![diagram],
        BondFunctions::new(Arc::new(HardSphere::new(1.0))),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "bond-out-of-range");

    let exchange = Diagram::new(
        vec![Bond::colored_pair(BondColor::Exchange, 0, 1)],
        Coefficient::integer(1),
    );
    let err = ClusterSum::new(
        2,
        vec![exchange],
        BondFunctions::new(Arc::new(HardSphere::new(1.0))),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "missing-bond-function");
}

#[test]
fn mixed_reference_bonds_use_the_reference_function() {
    let diagram = Diagram::new(
        vec![
            Bond::pair(0, 1),
            Bond::colored_pair(BondColor::Reference, 1, 2),
        ],
        Coefficient::integer(1),
    );
    let cluster = ClusterSum::new(
        3,
        vec![diagram],
        BondFunctions::new(Arc::new(HardSphere::new(1.0)))
            .with_reference(Arc::new(HardSphere::new(2.0))),
    )
    .unwrap();
    let config = points(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [2.0, 0.0, 0.0]]);
    // f01 = -1 (0.5 < 1), h12 = -1 (1.5 < 2)
    assert_eq!(cluster.value(&config, 1.0), 1.0);
}

#[test]
fn beta_series_matches_finite_differences() {
    let cluster = virial_cluster(3, Arc::new(PotentialMayer::new(lj()))).unwrap();
    let config = points(&[[0.0, 0.0, 0.0], [1.1, 0.0, 0.0], [0.4, 1.0, 0.2]]);
    let beta = 0.9;
    let h = 1e-4;
    let series = cluster.series(&config, beta, 2);
    let plus = cluster.value(&config, beta + h);
    let minus = cluster.value(&config, beta - h);
    let center = cluster.value(&config, beta);
    assert!((series[0] - center).abs() < 1e-14);
    let first = (plus - minus) / (2.0 * h);
    let second = (plus - 2.0 * center + minus) / (h * h);
    assert!((series[1] - first).abs() < 1e-6 * first.abs().max(1.0), "{} vs {first}", series[1]);
    assert!((series[2] - second).abs() < 1e-3 * second.abs().max(1.0), "{} vs {second}", series[2]);
}

#[test]
fn hard_bonds_have_no_beta_dependence() {
    let cluster = virial_cluster(2, Arc::new(HardSphere::new(1.0))).unwrap();
    let config = points(&[[0.0, 0.0, 0.0], [0.3, 0.0, 0.0]]);
    assert_eq!(cluster.series(&config, 1.0, 3), vec![0.5, 0.0, 0.0, 0.0]);
}

#[test]
fn collapsed_rings_reduce_to_the_classical_bond() {
    let ring = |x: f64| Molecule::ring(vec![Vec3::new(x, 0.0, 0.0); 4]);
    let config =
        Configuration::from_molecules(vec![ring(0.0), ring(1.2)], Boundary::Open).unwrap();
    let pair = PairGeometry::between(&config, 0, 1);
    let classical = PotentialMayer::new(lj()).f(&pair, 1.0);
    let averaged = RingAveraged::new(lj()).f(&pair, 1.0);
    let half = RingAveraged::with_stride(lj(), 2).f(&pair, 1.0);
    assert!((classical - averaged).abs() < 1e-14);
    assert!((classical - half).abs() < 1e-14);
}

#[test]
fn exchange_of_identical_rings_is_unity() {
    let beads = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.3, 0.1, 0.0),
        Vec3::new(0.2, 0.4, -0.1),
        Vec3::new(-0.1, 0.2, 0.1),
    ];
    let config = Configuration::from_molecules(
        vec![Molecule::ring(beads.clone()), Molecule::ring(beads)],
        Boundary::Open,
    )
    .unwrap();
    let spring = RingSpring::from_constant(4, 2.0).unwrap();
    let exchange = RingExchange::new(spring);
    let value = exchange.f(&PairGeometry::between(&config, 0, 1), 1.0);
    assert!((value - 1.0).abs() < 1e-14);
}

#[test]
fn axilrod_teller_equilateral_energy() {
    use virial_cluster::{TripleGeometry, TripleMayerFunction};
    let h = (3.0f64).sqrt() / 2.0;
    let config = points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, h, 0.0]]);
    let at = AxilrodTeller { nu: 2.0 };
    let triple = TripleGeometry::between(&config, 0, 1, 2);
    let energy = at.energy(&triple).unwrap();
    assert!((energy - 2.0 * 1.375).abs() < 1e-12);
    let f = at.f(&triple, 0.5);
    assert!((f - ((-0.5 * energy).exp() - 1.0)).abs() < 1e-14);
}
