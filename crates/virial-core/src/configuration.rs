//! Molecule positions sampled by one ensemble.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, VirialError};

/// Cartesian vector used for every bead position and displacement.
pub type Vec3 = Vector3<f64>;

/// Simulation boundary. The box never changes size during sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Boundary {
    /// Infinite open space, the usual choice for cluster integrals.
    #[default]
    Open,
    /// Cubic periodic box of edge `length` centred on the origin.
    Periodic {
        /// Edge length of the cube.
        length: f64,
    },
}

impl Boundary {
    /// Applies the minimum-image convention to a displacement.
    pub fn minimum_image(&self, delta: Vec3) -> Vec3 {
        match self {
            Boundary::Open => delta,
            Boundary::Periodic { length } => delta.map(|c| c - length * (c / length).round()),
        }
    }

    /// Shift that brings `point` back into the box `[-L/2, L/2)^3`.
    pub fn wrap_shift(&self, point: Vec3) -> Vec3 {
        match self {
            Boundary::Open => Vec3::zeros(),
            Boundary::Periodic { length } => point.map(|c| -length * (c / length).round()),
        }
    }

    fn validate(&self) -> Result<(), VirialError> {
        if let Boundary::Periodic { length } = self {
            if !(length.is_finite() && *length > 0.0) {
                return Err(VirialError::Configuration(
                    ErrorInfo::new("invalid-boundary", "periodic box length must be positive")
                        .with_context("length", length.to_string()),
                ));
            }
        }
        Ok(())
    }
}

/// One molecule: a single bead for classical treatment or a closed ring of
/// beads for a path-integral treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    beads: Vec<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orientation: Option<UnitQuaternion<f64>>,
}

impl Molecule {
    /// Classical point molecule.
    pub fn point(position: Vec3) -> Self {
        Self {
            beads: vec![position],
            orientation: None,
        }
    }

    /// Ring polymer from explicit bead positions.
    pub fn ring(beads: Vec<Vec3>) -> Self {
        Self {
            beads,
            orientation: None,
        }
    }

    /// Attaches an orientation to the molecule.
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f64>) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Number of beads.
    pub fn len(&self) -> usize {
        self.beads.len()
    }

    /// True if the molecule carries no beads.
    pub fn is_empty(&self) -> bool {
        self.beads.is_empty()
    }

    /// True if the molecule is a ring polymer with more than one bead.
    pub fn is_ring(&self) -> bool {
        self.beads.len() > 1
    }

    /// Bead positions in ring order.
    pub fn beads(&self) -> &[Vec3] {
        &self.beads
    }

    /// Mutable bead positions. The slice length is fixed.
    pub fn beads_mut(&mut self) -> &mut [Vec3] {
        &mut self.beads
    }

    /// Position of bead `index`, wrapping around the ring.
    pub fn bead(&self, index: usize) -> Vec3 {
        self.beads[index % self.beads.len()]
    }

    /// Optional orientation.
    pub fn orientation(&self) -> Option<&UnitQuaternion<f64>> {
        self.orientation.as_ref()
    }

    /// Centroid of the beads.
    pub fn centroid(&self) -> Vec3 {
        let sum = self.beads.iter().fold(Vec3::zeros(), |acc, bead| acc + bead);
        sum / self.beads.len().max(1) as f64
    }

    /// Rigid translation of every bead.
    pub fn translate(&mut self, delta: &Vec3) {
        for bead in &mut self.beads {
            *bead += delta;
        }
    }

    /// Rotates the beads about their centroid and composes the orientation.
    pub fn rotate_about_centroid(&mut self, rotation: &UnitQuaternion<f64>) {
        let center = self.centroid();
        for bead in &mut self.beads {
            *bead = center + rotation * (*bead - center);
        }
        self.orientation = Some(match self.orientation {
            Some(current) => rotation * current,
            None => *rotation,
        });
    }

    /// Sum of squared bond lengths around the closed ring. Zero for a point.
    pub fn spring_sum(&self) -> f64 {
        let count = self.beads.len();
        if count < 2 {
            return 0.0;
        }
        (0..count)
            .map(|j| (self.beads[(j + 1) % count] - self.beads[j]).norm_squared())
            .sum()
    }

    /// Squared radius of gyration about the centroid.
    pub fn radius_of_gyration_sq(&self) -> f64 {
        let center = self.centroid();
        let total: f64 = self
            .beads
            .iter()
            .map(|bead| (bead - center).norm_squared())
            .sum();
        total / self.beads.len().max(1) as f64
    }
}

/// Positions of every molecule in one ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    molecules: Vec<Molecule>,
    boundary: Boundary,
    beads_per_molecule: usize,
}

impl Configuration {
    /// Builds `molecules` molecules of `beads` beads each, all collapsed on
    /// the origin. This is the conventional starting point of a cluster walk.
    pub fn new(molecules: usize, beads: usize, boundary: Boundary) -> Result<Self, VirialError> {
        let list = (0..molecules)
            .map(|_| Molecule::ring(vec![Vec3::zeros(); beads]))
            .collect();
        Self::from_molecules(list, boundary)
    }

    /// Builds a configuration from explicit molecules, which must all carry
    /// the same number of beads.
    pub fn from_molecules(molecules: Vec<Molecule>, boundary: Boundary) -> Result<Self, VirialError> {
        boundary.validate()?;
        if molecules.is_empty() {
            return Err(VirialError::configuration(
                "empty-configuration",
                "a configuration needs at least one molecule",
            ));
        }
        let beads_per_molecule = molecules[0].len();
        if beads_per_molecule == 0 {
            return Err(VirialError::configuration(
                "empty-molecule",
                "molecules need at least one bead",
            ));
        }
        if let Some(index) = molecules.iter().position(|m| m.len() != beads_per_molecule) {
            return Err(VirialError::Configuration(
                ErrorInfo::new("ragged-beads", "every molecule must have the same bead count")
                    .with_context("molecule", index.to_string())
                    .with_context("expected", beads_per_molecule.to_string())
                    .with_context("found", molecules[index].len().to_string()),
            ));
        }
        Ok(Self {
            molecules,
            boundary,
            beads_per_molecule,
        })
    }

    /// Number of molecules.
    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    /// Always false for a constructed configuration.
    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    /// Beads per molecule, fixed at construction.
    pub fn beads_per_molecule(&self) -> usize {
        self.beads_per_molecule
    }

    /// Boundary of the box.
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// All molecules.
    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    /// Molecule `index`.
    pub fn molecule(&self, index: usize) -> &Molecule {
        &self.molecules[index]
    }

    /// Mutable access to molecule `index`.
    pub fn molecule_mut(&mut self, index: usize) -> &mut Molecule {
        &mut self.molecules[index]
    }

    /// Centroid of molecule `index`.
    pub fn centroid(&self, index: usize) -> Vec3 {
        self.molecules[index].centroid()
    }

    /// Minimum-image centroid displacement from molecule `i` to molecule `j`.
    pub fn displacement(&self, i: usize, j: usize) -> Vec3 {
        self.boundary
            .minimum_image(self.centroid(j) - self.centroid(i))
    }

    /// Shift to add to the beads of `j` so that they sit in the image nearest
    /// to molecule `i`.
    pub fn image_shift(&self, i: usize, j: usize) -> Vec3 {
        let raw = self.centroid(j) - self.centroid(i);
        self.boundary.minimum_image(raw) - raw
    }

    /// Squared minimum-image centroid separation.
    pub fn separation_sq(&self, i: usize, j: usize) -> f64 {
        self.displacement(i, j).norm_squared()
    }

    /// Translates molecule `index` and folds its centroid back into the box.
    pub fn translate_molecule(&mut self, index: usize, delta: &Vec3) {
        let molecule = &mut self.molecules[index];
        molecule.translate(delta);
        let shift = self.boundary.wrap_shift(molecule.centroid());
        if shift != Vec3::zeros() {
            molecule.translate(&shift);
        }
    }

    /// Total squared bond length over every ring.
    pub fn spring_sum(&self) -> f64 {
        self.molecules.iter().map(Molecule::spring_sum).sum()
    }
}
