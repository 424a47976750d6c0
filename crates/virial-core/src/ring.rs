//! Harmonic bead-to-bead coupling of path-integral ring polymers.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::configuration::Molecule;
use crate::errors::{ErrorInfo, VirialError};

const PLANCK: f64 = 6.626_070_15e-34;
const BOLTZMANN: f64 = 1.380_649e-23;
const DALTON: f64 = 1.660_539_066_60e-27;

/// Thermal de Broglie wavelength `h / sqrt(2 pi m kT)` in Angstrom for a mass
/// in Dalton and a temperature in Kelvin.
pub fn thermal_wavelength(mass_dalton: f64, temperature_kelvin: f64) -> f64 {
    let mass = mass_dalton * DALTON;
    PLANCK / (2.0 * PI * mass * BOLTZMANN * temperature_kelvin).sqrt() * 1e10
}

/// Ring weight `exp(-k sum |r_{j+1} - r_j|^2)` with `k = B pi / lambda^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingSpring {
    beads: usize,
    k: f64,
}

impl RingSpring {
    /// Spring for rings of `beads` beads at thermal wavelength `wavelength`.
    pub fn from_wavelength(beads: usize, wavelength: f64) -> Result<Self, VirialError> {
        if beads < 2 {
            return Err(VirialError::Configuration(
                ErrorInfo::new("ring-too-small", "ring polymers need at least two beads")
                    .with_context("beads", beads.to_string()),
            ));
        }
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(VirialError::Configuration(
                ErrorInfo::new("invalid-wavelength", "thermal wavelength must be positive")
                    .with_context("wavelength", wavelength.to_string()),
            ));
        }
        Ok(Self {
            beads,
            k: beads as f64 * PI / (wavelength * wavelength),
        })
    }

    /// Spring from an explicit constant `k`.
    pub fn from_constant(beads: usize, k: f64) -> Result<Self, VirialError> {
        if beads < 2 || !(k.is_finite() && k > 0.0) {
            return Err(VirialError::Configuration(
                ErrorInfo::new("invalid-spring", "spring needs two beads and a positive constant")
                    .with_context("beads", beads.to_string())
                    .with_context("k", k.to_string()),
            ));
        }
        Ok(Self { beads, k })
    }

    /// Beads per ring.
    pub fn beads(&self) -> usize {
        self.beads
    }

    /// Energy factor `k` in `exp(-k sum d^2)`.
    pub fn constant(&self) -> f64 {
        self.k
    }

    /// Per-coordinate variance of a single bond, `1 / (2k)`.
    pub fn bond_variance(&self) -> f64 {
        0.5 / self.k
    }

    /// Natural log of the ring weight of `molecule`.
    pub fn log_weight(&self, molecule: &Molecule) -> f64 {
        -self.k * molecule.spring_sum()
    }

    /// Mean squared radius of gyration of a free ring, `(B^2 - 1) / (8 k B)`.
    pub fn mean_radius_of_gyration_sq(&self) -> f64 {
        let b = self.beads as f64;
        (b * b - 1.0) / (8.0 * self.k * b)
    }
}
