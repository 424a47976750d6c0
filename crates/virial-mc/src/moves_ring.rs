//! Ring-polymer proposals.
//!
//! A ring of `B` beads carries the harmonic weight `exp(-k sum d^2)`, so every
//! bond vector is Gaussian with per-coordinate variance `1 / (2k)` and any
//! stretch of beads between two fixed beads is a Brownian bridge. The moves
//! below draw from those bridges exactly; only the partial regrowth adds a
//! bias from the other molecules.

use rand_distr::{Distribution, StandardNormal};
use virial_core::{Configuration, RingSpring, RngHandle, Vec3};

use crate::moves::{MoveContext, MoveKind, MoveRecord};

fn gaussian(rng: &mut RngHandle, sd: f64) -> Vec3 {
    let x: f64 = StandardNormal.sample(rng.inner_mut());
    let y: f64 = StandardNormal.sample(rng.inner_mut());
    let z: f64 = StandardNormal.sample(rng.inner_mut());
    Vec3::new(x, y, z) * sd
}

/// Bead `m` of a bridge between bead `l` at `a` and bead `r` at `b`.
fn bridge_point(
    a: &Vec3,
    b: &Vec3,
    l: usize,
    m: usize,
    r: usize,
    bond_variance: f64,
    rng: &mut RngHandle,
) -> Vec3 {
    let span = (r - l) as f64;
    let left = (m - l) as f64;
    let right = (r - m) as f64;
    let mean = a + (b - a) * (left / span);
    mean + gaussian(rng, (bond_variance * left * right / span).sqrt())
}

fn bisect(points: &mut [Vec3], l: usize, r: usize, bond_variance: f64, rng: &mut RngHandle) {
    if r - l < 2 {
        return;
    }
    let m = (l + r) / 2;
    let (a, b) = (points[l], points[r]);
    points[m] = bridge_point(&a, &b, l, m, r, bond_variance, rng);
    bisect(points, l, m, bond_variance, rng);
    bisect(points, m, r, bond_variance, rng);
}

/// Free ring of `spring.beads()` beads drawn exactly from the harmonic
/// weight by recursive bisection, bead 0 at the origin.
pub fn sample_free_ring(spring: &RingSpring, rng: &mut RngHandle) -> Vec<Vec3> {
    let beads = spring.beads();
    // Slot `beads` is the image of bead 0 that closes the ring.
    let mut points = vec![Vec3::zeros(); beads + 1];
    bisect(&mut points, 0, beads, spring.bond_variance(), rng);
    points.truncate(beads);
    points
}

/// Replaces one random ring with a fresh free ring sharing its centroid.
pub fn regrow_full(
    config: &Configuration,
    spring: &RingSpring,
    rng: &mut RngHandle,
) -> MoveRecord {
    let mut trial = config.clone();
    let index = rng.index(trial.len());
    let center = trial.centroid(index);
    let beads = sample_free_ring(spring, rng);
    let count = beads.len() as f64;
    let shift = center - beads.iter().fold(Vec3::zeros(), |acc, b| acc + b) / count;
    for (slot, bead) in trial.molecule_mut(index).beads_mut().iter_mut().zip(beads.iter()) {
        *slot = *bead + shift;
    }
    MoveRecord {
        kind: MoveKind::RingRegrowFull,
        trial,
        log_bias: 0.0,
    }
}

/// Bias factor of bead `bead` of molecule `index` placed at `x`.
fn bead_weight(
    config: &Configuration,
    index: usize,
    bead: usize,
    x: &Vec3,
    ctx: &MoveContext<'_>,
) -> f64 {
    let potential = match ctx.regrow_bias {
        Some(potential) => potential,
        None => return 1.0,
    };
    let mut energy = 0.0;
    for other in (0..config.len()).filter(|&o| o != index) {
        let image = config.molecule(other).bead(bead) + config.image_shift(index, other);
        let u = potential.energy((image - x).norm_squared());
        if u == f64::INFINITY {
            return 0.0;
        }
        energy += u;
    }
    (-ctx.beta / config.beads_per_molecule() as f64 * energy).exp()
}

fn pick(candidates: &[(Vec3, f64)], total: f64, rng: &mut RngHandle) -> (Vec3, f64) {
    let mut target = rng.uniform() * total;
    for &(x, w) in candidates {
        if target < w {
            return (x, w);
        }
        target -= w;
    }
    candidates
        .iter()
        .rev()
        .find(|(_, w)| *w > 0.0)
        .copied()
        .unwrap_or(candidates[0])
}

/// Rebuilds an arc of `round(step)` consecutive beads of one random ring
/// between its two fixed neighbours, bead by bead from the Gaussian bridge.
///
/// With a regrow bias every bead is chosen among `partial_trials`
/// candidates by Rosenbluth weighting and the returned `log_bias` carries
/// the Rosenbluth ratio of the new and old arcs divided by their bias
/// factors. Returns `None` when no candidate of some bead has weight, or
/// when the old arc could not have been generated.
pub fn regrow_partial(
    config: &Configuration,
    spring: &RingSpring,
    ctx: &MoveContext<'_>,
    rng: &mut RngHandle,
) -> Option<MoveRecord> {
    let beads = config.beads_per_molecule();
    let index = rng.index(config.len());
    let arc = (ctx.step.round().max(1.0) as usize).min(beads - 1);
    let start = rng.index(beads);
    let molecule = config.molecule(index);
    let left = molecule.bead(start + beads - 1);
    let right = molecule.bead(start + arc);
    let variance = spring.bond_variance();
    let trials = if ctx.regrow_bias.is_some() {
        ctx.partial_trials.max(1)
    } else {
        1
    };

    let mut rebuilt = Vec::with_capacity(arc);
    let mut log_bias = 0.0;
    let mut prev = left;
    let mut old_prev = left;
    for t in 0..arc {
        let bead = (start + t) % beads;
        // Bridge from the previous bead (offset 0) to the right end (offset
        // `remaining + 1`) evaluated at offset 1.
        let remaining = arc - t;
        let chosen = if ctx.regrow_bias.is_none() {
            bridge_point(&prev, &right, 0, 1, remaining + 1, variance, rng)
        } else {
            let candidates: Vec<(Vec3, f64)> = (0..trials)
                .map(|_| {
                    let x = bridge_point(&prev, &right, 0, 1, remaining + 1, variance, rng);
                    let w = bead_weight(config, index, bead, &x, ctx);
                    (x, w)
                })
                .collect();
            let total: f64 = candidates.iter().map(|(_, w)| w).sum();
            if !(total > 0.0 && total.is_finite()) {
                return None;
            }
            let (x, w) = pick(&candidates, total, rng);
            log_bias += (total / trials as f64).ln() - w.ln();

            let old = molecule.bead(bead);
            let w_old = bead_weight(config, index, bead, &old, ctx);
            if w_old <= 0.0 {
                return None;
            }
            let mut total_old = w_old;
            for _ in 1..trials {
                let x = bridge_point(&old_prev, &right, 0, 1, remaining + 1, variance, rng);
                total_old += bead_weight(config, index, bead, &x, ctx);
            }
            log_bias -= (total_old / trials as f64).ln() - w_old.ln();
            old_prev = old;
            x
        };
        rebuilt.push(chosen);
        prev = chosen;
    }

    let mut trial = config.clone();
    let slots = trial.molecule_mut(index).beads_mut();
    for (t, x) in rebuilt.into_iter().enumerate() {
        slots[(start + t) % beads] = x;
    }
    Some(MoveRecord {
        kind: MoveKind::RingRegrowPartial,
        trial,
        log_bias,
    })
}

/// Scales one random ring about its centroid by `exp(step (u - 1/2))`.
///
/// `log_bias` is the harmonic weight ratio plus the Jacobian of the
/// `3(B - 1)` internal coordinates.
pub fn scale(
    config: &Configuration,
    spring: &RingSpring,
    step: f64,
    rng: &mut RngHandle,
) -> MoveRecord {
    let mut trial = config.clone();
    let index = rng.index(trial.len());
    let factor = (step * (rng.uniform() - 0.5)).exp();
    let molecule = trial.molecule_mut(index);
    let spring_sum = molecule.spring_sum();
    let center = molecule.centroid();
    for bead in molecule.beads_mut() {
        *bead = center + (*bead - center) * factor;
    }
    let internal = 3.0 * (molecule.len() as f64 - 1.0);
    let log_bias =
        -spring.constant() * (factor * factor - 1.0) * spring_sum + internal * factor.ln();
    MoveRecord {
        kind: MoveKind::RingScale,
        trial,
        log_bias,
    }
}
