//! Mayer bond functions and the pair potentials behind them.
//!
//! All functions here are stateless and pure: they read the geometry handed to
//! them and return a value. An infinite energy maps to `f = -1`, never to an
//! error.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use virial_core::{Configuration, Molecule, RingSpring, Vec3};

/// Geometry of a molecule pair as seen by a pair bond.
#[derive(Debug, Clone, Copy)]
pub struct PairGeometry<'a> {
    /// First molecule.
    pub first: &'a Molecule,
    /// Second molecule.
    pub second: &'a Molecule,
    /// Periodic image shift to add to every bead of `second`.
    pub shift: Vec3,
    /// Squared minimum-image centroid separation.
    pub r2: f64,
}

impl<'a> PairGeometry<'a> {
    /// Geometry of molecules `i` and `j` of a configuration.
    pub fn between(config: &'a Configuration, i: usize, j: usize) -> Self {
        Self {
            first: config.molecule(i),
            second: config.molecule(j),
            shift: config.image_shift(i, j),
            r2: config.separation_sq(i, j),
        }
    }

    /// Squared distance between bead `bead` of both molecules.
    pub fn bead_separation_sq(&self, bead: usize) -> f64 {
        (self.second.bead(bead) + self.shift - self.first.bead(bead)).norm_squared()
    }
}

/// Geometry of a molecule triple: the molecules and the squared centroid
/// separations `[r01, r02, r12]`.
#[derive(Debug, Clone, Copy)]
pub struct TripleGeometry<'a> {
    /// The three molecules in index order.
    pub molecules: [&'a Molecule; 3],
    /// Squared separations `[r01^2, r02^2, r12^2]`.
    pub r2: [f64; 3],
}

impl<'a> TripleGeometry<'a> {
    /// Geometry of molecules `i`, `j`, `k` of a configuration.
    pub fn between(config: &'a Configuration, i: usize, j: usize, k: usize) -> Self {
        Self {
            molecules: [config.molecule(i), config.molecule(j), config.molecule(k)],
            r2: [
                config.separation_sq(i, j),
                config.separation_sq(i, k),
                config.separation_sq(j, k),
            ],
        }
    }
}

/// Pair bond function, typically `exp(-beta u) - 1`.
pub trait MayerFunction: Debug + Send + Sync {
    /// Bond value for the pair at inverse temperature `beta`.
    fn f(&self, pair: &PairGeometry<'_>, beta: f64) -> f64;

    /// Pair energy behind the bond. `None` marks a temperature independent
    /// bond, whose beta derivatives vanish.
    fn energy(&self, _pair: &PairGeometry<'_>) -> Option<f64> {
        None
    }
}

/// Three-body bond function.
pub trait TripleMayerFunction: Debug + Send + Sync {
    /// Bond value for the triple at inverse temperature `beta`.
    fn f(&self, triple: &TripleGeometry<'_>, beta: f64) -> f64;

    /// Three-body energy behind the bond, if any.
    fn energy(&self, _triple: &TripleGeometry<'_>) -> Option<f64> {
        None
    }
}

/// Spherically symmetric pair potential of the squared separation.
pub trait PairPotential: Debug + Send + Sync {
    /// Energy at squared separation `r2`. May be `f64::INFINITY`.
    fn energy(&self, r2: f64) -> f64;
}

/// `exp(-beta u) - 1`, with an infinite energy giving exactly `-1`.
pub fn boltzmann_bond(beta: f64, energy: f64) -> f64 {
    if energy == f64::INFINITY {
        -1.0
    } else {
        (-beta * energy).exp_m1()
    }
}

/// Hard-sphere Mayer function on centroid separations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardSphere {
    /// Sphere diameter.
    pub sigma: f64,
}

impl HardSphere {
    /// Hard spheres of diameter `sigma`.
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }
}

impl MayerFunction for HardSphere {
    fn f(&self, pair: &PairGeometry<'_>, _beta: f64) -> f64 {
        if pair.r2 < self.sigma * self.sigma {
            -1.0
        } else {
            0.0
        }
    }
}

/// Classical Mayer function of a pair potential on centroid separations.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialMayer<P> {
    potential: P,
}

impl<P: PairPotential> PotentialMayer<P> {
    /// Wraps a pair potential.
    pub fn new(potential: P) -> Self {
        Self { potential }
    }
}

impl<P: PairPotential> MayerFunction for PotentialMayer<P> {
    fn f(&self, pair: &PairGeometry<'_>, beta: f64) -> f64 {
        boltzmann_bond(beta, self.potential.energy(pair.r2))
    }

    fn energy(&self, pair: &PairGeometry<'_>) -> Option<f64> {
        Some(self.potential.energy(pair.r2))
    }
}

/// Path-integral Mayer function: the pair energy averaged over corresponding
/// beads of two rings, `exp(-(beta/P') sum_k u(r_k)) - 1`.
///
/// With `stride = 2` only every other bead takes part, which is the
/// half-resolution discretization subtracted in difference clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct RingAveraged<P> {
    potential: P,
    stride: usize,
}

impl<P: PairPotential> RingAveraged<P> {
    /// Full-resolution ring average.
    pub fn new(potential: P) -> Self {
        Self {
            potential,
            stride: 1,
        }
    }

    /// Ring average over every `stride`-th bead.
    pub fn with_stride(potential: P, stride: usize) -> Self {
        Self {
            potential,
            stride: stride.max(1),
        }
    }

    fn average_energy(&self, pair: &PairGeometry<'_>) -> f64 {
        let beads = pair.first.len();
        let mut total = 0.0;
        let mut count = 0usize;
        for bead in (0..beads).step_by(self.stride) {
            let u = self.potential.energy(pair.bead_separation_sq(bead));
            if u == f64::INFINITY {
                return f64::INFINITY;
            }
            total += u;
            count += 1;
        }
        total / count.max(1) as f64
    }
}

impl<P: PairPotential> MayerFunction for RingAveraged<P> {
    fn f(&self, pair: &PairGeometry<'_>, beta: f64) -> f64 {
        boltzmann_bond(beta, self.average_energy(pair))
    }

    fn energy(&self, pair: &PairGeometry<'_>) -> Option<f64> {
        Some(self.average_energy(pair))
    }
}

/// Exchange factor of two rings: the spring weight of the single ring formed
/// by cross-linking their closing bonds, relative to the two separate rings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingExchange {
    spring: RingSpring,
}

impl RingExchange {
    /// Exchange factor for rings coupled by `spring`.
    pub fn new(spring: RingSpring) -> Self {
        Self { spring }
    }
}

impl MayerFunction for RingExchange {
    fn f(&self, pair: &PairGeometry<'_>, _beta: f64) -> f64 {
        let last = pair.first.len() - 1;
        let a0 = pair.first.bead(0);
        let a_last = pair.first.bead(last);
        let b0 = pair.second.bead(0) + pair.shift;
        let b_last = pair.second.bead(last) + pair.shift;
        let crossed = (b0 - a_last).norm_squared() + (a0 - b_last).norm_squared();
        let closed = (a0 - a_last).norm_squared() + (b0 - b_last).norm_squared();
        (-self.spring.constant() * (crossed - closed)).exp()
    }
}

/// Lennard-Jones 12-6 potential.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LennardJones {
    /// Well depth.
    pub epsilon: f64,
    /// Size parameter.
    pub sigma: f64,
}

impl PairPotential for LennardJones {
    fn energy(&self, r2: f64) -> f64 {
        if r2 == 0.0 {
            return f64::INFINITY;
        }
        let s6 = (self.sigma * self.sigma / r2).powi(3);
        4.0 * self.epsilon * (s6 * s6 - s6)
    }
}

/// Square-well potential: hard core `sigma`, well of depth `epsilon` out to
/// `lambda * sigma`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareWell {
    /// Hard-core diameter.
    pub sigma: f64,
    /// Well range in units of `sigma`.
    pub lambda: f64,
    /// Well depth.
    pub epsilon: f64,
}

impl PairPotential for SquareWell {
    fn energy(&self, r2: f64) -> f64 {
        let core = self.sigma * self.sigma;
        if r2 < core {
            f64::INFINITY
        } else if r2 < core * self.lambda * self.lambda {
            -self.epsilon
        } else {
            0.0
        }
    }
}

/// Axilrod-Teller triple-dipole three-body Mayer function
/// `exp(-beta u_AT) - 1`, `u_AT = nu (1 + 3 cos a cos b cos c) / (r01 r02 r12)^3`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxilrodTeller {
    /// Dispersion coefficient.
    pub nu: f64,
}

impl AxilrodTeller {
    fn triple_energy(&self, r2: &[f64; 3]) -> f64 {
        let [a, b, c] = *r2;
        if a == 0.0 || b == 0.0 || c == 0.0 {
            return 0.0;
        }
        let (ra, rb, rc) = (a.sqrt(), b.sqrt(), c.sqrt());
        // Angles at molecule 0, 1 and 2 from the law of cosines.
        let cos0 = (a + b - c) / (2.0 * ra * rb);
        let cos1 = (a + c - b) / (2.0 * ra * rc);
        let cos2 = (b + c - a) / (2.0 * rb * rc);
        self.nu * (1.0 + 3.0 * cos0 * cos1 * cos2) / (a * b * c).powf(1.5)
    }
}

impl TripleMayerFunction for AxilrodTeller {
    fn f(&self, triple: &TripleGeometry<'_>, beta: f64) -> f64 {
        boltzmann_bond(beta, self.triple_energy(&triple.r2))
    }

    fn energy(&self, triple: &TripleGeometry<'_>) -> Option<f64> {
        Some(self.triple_energy(&triple.r2))
    }
}
