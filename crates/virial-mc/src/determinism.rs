use virial_core::{derive_substream_seed, RngHandle};

use crate::ensemble::EnsembleKind;

const CONTROLLER_STREAM: u64 = 0xC0_17_u64;

/// Derives the deterministic seed of one ensemble's walk.
pub fn ensemble_seed(master_seed: u64, kind: EnsembleKind) -> u64 {
    derive_substream_seed(master_seed, kind.index() as u64)
}

/// Derives the seed of the controller's ensemble-selection stream.
pub fn controller_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, CONTROLLER_STREAM)
}

/// RNG handle for an ensemble.
pub fn ensemble_rng(master_seed: u64, kind: EnsembleKind) -> RngHandle {
    RngHandle::from_seed(ensemble_seed(master_seed, kind))
}

/// RNG handle for the controller.
pub fn controller_rng(master_seed: u64) -> RngHandle {
    RngHandle::from_seed(controller_seed(master_seed))
}
