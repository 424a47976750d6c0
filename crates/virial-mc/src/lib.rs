#![deny(missing_docs)]

//! Dual-ensemble overlap sampling of virial cluster integrals.
//!
//! A reference cluster with a known integral and a target cluster are
//! sampled by two Metropolis walks. An [`OverlapController`] splits the
//! effort between them, records Bennett's overlap function and turns the
//! block-averaged statistics into the ratio of the two integrals. [`run`]
//! drives calibration, production and the refpref checkpoint end to end.

/// Blocked running statistics.
pub mod accumulator;
/// Equilibration and alpha search.
pub mod calibration;
/// refpref checkpoint naming and I/O.
pub mod checkpoint;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Metropolis walk over one cluster.
pub mod ensemble;
/// Run driver and result types.
pub mod kernel;
/// Run manifest serialization helpers.
pub mod manifest;
/// Histogram of the target's pair distance.
pub mod metrics;
/// Move kinds and proposal dispatch.
pub mod moves;
/// Rigid-body proposals.
pub mod moves_rigid;
/// Ring-polymer proposals.
pub mod moves_ring;
/// Overlap controller and estimator.
pub mod overlap;

pub use accumulator::BlockAccumulator;
pub use calibration::{alpha_grid, locate_alpha, AlphaRoot, CalibrationOutcome};
pub use checkpoint::{Additivity, DiscretizationMode, RefPref, RefPrefKey};
pub use config::{
    CalibrationConfig, CheckpointConfig, HistogramConfig, MoveConfig, MoveSetting, OutputConfig,
    OverlapConfig, RingConfig, RunConfig, SeedPolicy, TuningConfig,
};
pub use ensemble::{
    Ensemble, EnsembleKind, Evaluation, MoveTally, Phase, SamplingParams, SamplingWeight,
    StepOutcome,
};
pub use kernel::{run, EnsembleReport, ObservableResult, Simulation, VirialResult, VirialSystem};
pub use manifest::RunManifest;
pub use metrics::{Histogram, HistogramBin};
pub use moves::{propose, MoveContext, MoveKind, MoveRecord};
pub use overlap::{
    neyman_fraction, overlap_value, OverlapController, OverlapEstimate, StopHandle, MICRO_STEPS,
};
