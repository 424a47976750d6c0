#![deny(missing_docs)]
#![doc = "Diagrammatic cluster values for virial coefficients: bond structures, Mayer functions, difference clusters and hard-sphere reference integrals."]

pub mod cluster;
pub mod diagram;
pub mod graphs;
pub mod hard_sphere;
pub mod mayer;

pub use cluster::{BondFunctions, ClusterSum, ClusterValue};
pub use diagram::{Bond, BondColor, Coefficient, Diagram};
pub use mayer::{
    boltzmann_bond, AxilrodTeller, HardSphere, LennardJones, MayerFunction, PairGeometry,
    PairPotential, PotentialMayer, RingAveraged, RingExchange, SquareWell, TripleGeometry,
    TripleMayerFunction,
};
