use serde::{Deserialize, Serialize};
use virial_cluster::PairPotential;
use virial_core::{Configuration, ErrorInfo, RingSpring, RngHandle, VirialError};

use crate::moves_rigid;
use crate::moves_ring;

/// Kind of trial move an ensemble can propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveKind {
    /// Rigid translation of every molecule except molecule 0.
    Translate,
    /// Rigid rotation of every molecule about its centroid.
    Rotate,
    /// Exact regrowth of one whole ring.
    RingRegrowFull,
    /// Biased rebuild of an arc of one ring.
    RingRegrowPartial,
    /// Dilation of one ring about its centroid.
    RingScale,
}

impl MoveKind {
    /// Every move kind in declaration order.
    pub const ALL: [MoveKind; 5] = [
        MoveKind::Translate,
        MoveKind::Rotate,
        MoveKind::RingRegrowFull,
        MoveKind::RingRegrowPartial,
        MoveKind::RingScale,
    ];

    /// Stable name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::Translate => "translate",
            MoveKind::Rotate => "rotate",
            MoveKind::RingRegrowFull => "ring-regrow-full",
            MoveKind::RingRegrowPartial => "ring-regrow-partial",
            MoveKind::RingScale => "ring-scale",
        }
    }

    /// True for moves that need molecules with more than one bead.
    pub fn is_ring_move(&self) -> bool {
        matches!(
            self,
            MoveKind::RingRegrowFull | MoveKind::RingRegrowPartial | MoveKind::RingScale
        )
    }

    /// True for moves whose step size is tuned during equilibration.
    pub fn is_tunable(&self) -> bool {
        !matches!(self, MoveKind::RingRegrowFull)
    }
}

/// A proposed trial configuration, alive for one accept/reject decision.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    /// Move that produced the trial.
    pub kind: MoveKind,
    /// Trial configuration.
    pub trial: Configuration,
    /// Log of the reverse-to-forward proposal ratio times any weight the
    /// proposal sampled exactly.
    pub log_bias: f64,
}

/// Read-only parameters a proposal needs besides the configuration.
#[derive(Debug, Clone, Copy)]
pub struct MoveContext<'a> {
    /// Current step size of the move.
    pub step: f64,
    /// Inverse temperature, used by the partial-regrow bias.
    pub beta: f64,
    /// Harmonic ring coupling; required by ring moves.
    pub spring: Option<&'a RingSpring>,
    /// Candidates per bead in partial regrowth.
    pub partial_trials: usize,
    /// Pair potential steering partial regrowth away from other molecules.
    pub regrow_bias: Option<&'a dyn PairPotential>,
}

impl<'a> MoveContext<'a> {
    fn ring_spring(
        &self,
        kind: MoveKind,
        config: &Configuration,
    ) -> Result<&'a RingSpring, VirialError> {
        if config.beads_per_molecule() < 2 {
            return Err(VirialError::Configuration(
                ErrorInfo::new("ring-move-classical", "ring move proposed on single-bead molecules")
                    .with_context("move", kind.as_str()),
            ));
        }
        self.spring.ok_or_else(|| {
            VirialError::Configuration(
                ErrorInfo::new("missing-spring", "ring move proposed without a ring spring")
                    .with_context("move", kind.as_str()),
            )
        })
    }
}

/// Proposes a move of `kind` from `config`.
///
/// `Ok(None)` is a proposal that failed on its own terms (no viable
/// partial-regrow candidate) and counts as a rejection.
pub fn propose(
    kind: MoveKind,
    config: &Configuration,
    ctx: &MoveContext<'_>,
    rng: &mut RngHandle,
) -> Result<Option<MoveRecord>, VirialError> {
    let record = match kind {
        MoveKind::Translate => Some(moves_rigid::translate(config, ctx.step, rng)),
        MoveKind::Rotate => Some(moves_rigid::rotate(config, ctx.step, rng)),
        MoveKind::RingRegrowFull => {
            let spring = ctx.ring_spring(kind, config)?;
            Some(moves_ring::regrow_full(config, spring, rng))
        }
        MoveKind::RingRegrowPartial => {
            let spring = ctx.ring_spring(kind, config)?;
            moves_ring::regrow_partial(config, spring, ctx, rng)
        }
        MoveKind::RingScale => {
            let spring = ctx.ring_spring(kind, config)?;
            Some(moves_ring::scale(config, spring, ctx.step, rng))
        }
    };
    Ok(record)
}
