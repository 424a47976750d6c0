use nalgebra::{Unit, UnitQuaternion};
use rand_distr::{Distribution, StandardNormal};
use virial_core::{Configuration, RngHandle, Vec3};

use crate::moves::{MoveKind, MoveRecord};

/// Displaces every molecule except the anchor by an independent uniform
/// vector in `[-step, step]^3`.
pub fn translate(config: &Configuration, step: f64, rng: &mut RngHandle) -> MoveRecord {
    let mut trial = config.clone();
    for index in 1..trial.len() {
        let delta = Vec3::new(rng.symmetric(step), rng.symmetric(step), rng.symmetric(step));
        trial.translate_molecule(index, &delta);
    }
    MoveRecord {
        kind: MoveKind::Translate,
        trial,
        log_bias: 0.0,
    }
}

/// Isotropically distributed unit axis.
pub fn random_axis(rng: &mut RngHandle) -> Unit<Vec3> {
    loop {
        let v = Vec3::new(
            StandardNormal.sample(rng.inner_mut()),
            StandardNormal.sample(rng.inner_mut()),
            StandardNormal.sample(rng.inner_mut()),
        );
        if v.norm_squared() > 1e-24 {
            return Unit::new_normalize(v);
        }
    }
}

/// Rotates every molecule about its centroid by a uniform angle in
/// `[-step, step]` about its own random axis.
pub fn rotate(config: &Configuration, step: f64, rng: &mut RngHandle) -> MoveRecord {
    let mut trial = config.clone();
    for index in 0..trial.len() {
        let axis = random_axis(rng);
        let angle = rng.symmetric(step);
        let rotation = UnitQuaternion::from_axis_angle(&axis, angle);
        trial.molecule_mut(index).rotate_about_centroid(&rotation);
    }
    MoveRecord {
        kind: MoveKind::Rotate,
        trial,
        log_bias: 0.0,
    }
}
