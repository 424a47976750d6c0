#![deny(missing_docs)]
#![doc = "Core types for the virial overlap sampler: molecule configurations, ring-polymer springs, the error taxonomy and deterministic RNG handles."]

pub mod configuration;
pub mod errors;
pub mod ring;
pub mod rng;

pub use configuration::{Boundary, Configuration, Molecule, Vec3};
pub use errors::{ErrorInfo, VirialError};
pub use ring::{thermal_wavelength, RingSpring};
pub use rng::{derive_substream_seed, RngHandle};
