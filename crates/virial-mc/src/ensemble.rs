//! One Metropolis walk biased by its own absolute sampling weight.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use virial_cluster::{ClusterValue, PairPotential};
use virial_core::{
    thermal_wavelength, Configuration, ErrorInfo, RingSpring, RngHandle, VirialError,
};

use crate::config::{MoveConfig, RunConfig, TuningConfig};
use crate::moves::{self, MoveContext, MoveKind};
use crate::moves_rigid;
use crate::moves_ring;

/// Which side of the overlap estimator an ensemble samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnsembleKind {
    /// System with a known integral.
    Reference,
    /// System whose integral is sought.
    Target,
}

impl EnsembleKind {
    /// Position in two-element arrays.
    pub fn index(&self) -> usize {
        match self {
            EnsembleKind::Reference => 0,
            EnsembleKind::Target => 1,
        }
    }

    /// The opposite ensemble.
    pub fn other(&self) -> Self {
        match self {
            EnsembleKind::Reference => EnsembleKind::Target,
            EnsembleKind::Target => EnsembleKind::Reference,
        }
    }

    /// Stable name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnsembleKind::Reference => "reference",
            EnsembleKind::Target => "target",
        }
    }
}

/// Walk phase. Step sizes are tuned only while equilibrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Step sizes adapt toward the target acceptance.
    Equilibrating,
    /// Step sizes are frozen.
    Sampling,
}

/// Absolute weight an ensemble samples.
#[derive(Debug, Clone)]
pub enum SamplingWeight {
    /// `|value|` of the ensemble's own cluster.
    Absolute,
    /// `|value| + sum c_i |partner_i|`, a weight that overlaps several
    /// clusters at once.
    Umbrella {
        /// Coefficients and partner clusters.
        partners: Vec<(f64, ClusterValue)>,
    },
}

impl SamplingWeight {
    fn weight(&self, value: f64, config: &Configuration, beta: f64) -> f64 {
        match self {
            SamplingWeight::Absolute => value.abs(),
            SamplingWeight::Umbrella { partners } => partners
                .iter()
                .fold(value.abs(), |acc, (c, cluster)| {
                    acc + c * cluster.value(config, beta).abs()
                }),
        }
    }
}

/// Parameters shared by both ensembles of a run.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    /// Inverse temperature.
    pub beta: f64,
    /// Move frequencies and step bounds.
    pub moves: MoveConfig,
    /// Step-size tuning.
    pub tuning: TuningConfig,
    /// Ring coupling, present when molecules carry several beads.
    pub spring: Option<RingSpring>,
    /// Candidates per bead in partial regrowth.
    pub partial_trials: usize,
    /// Unconditional moves tried on a zero-weight start.
    pub init_attempts: usize,
    /// Optional pair potential biasing partial regrowth.
    pub regrow_bias: Option<Arc<dyn PairPotential>>,
}

impl SamplingParams {
    /// Derives the sampling parameters of a validated run configuration.
    pub fn from_config(config: &RunConfig) -> Result<Self, VirialError> {
        let spring = if config.beads > 1 {
            let wavelength = match (config.ring.wavelength, config.ring.mass) {
                (Some(wavelength), _) => wavelength,
                (None, Some(mass)) => thermal_wavelength(mass, config.temperature),
                (None, None) => {
                    return Err(VirialError::Configuration(
                        ErrorInfo::new("ring-scale", "ring molecules need a wavelength or a mass")
                            .with_context("beads", config.beads.to_string()),
                    ))
                }
            };
            Some(RingSpring::from_wavelength(config.beads, wavelength)?)
        } else {
            None
        };
        Ok(Self {
            beta: config.beta(),
            moves: config.moves.clone(),
            tuning: config.tuning.clone(),
            spring,
            partial_trials: config.ring.partial_trials,
            init_attempts: config.calibration.init_attempts,
            regrow_bias: None,
        })
    }

    /// Biases partial regrowth with `potential`.
    pub fn with_regrow_bias(mut self, potential: Arc<dyn PairPotential>) -> Self {
        self.regrow_bias = Some(potential);
        self
    }
}

/// Proposal and acceptance counts of one move kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveTally {
    /// Proposals since construction.
    pub proposed: u64,
    /// Acceptances since construction.
    pub accepted: u64,
    window_proposed: u64,
    window_accepted: u64,
}

impl MoveTally {
    fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        self.window_proposed += 1;
        if accepted {
            self.accepted += 1;
            self.window_accepted += 1;
        }
    }

    /// Accepted fraction, 0 before any proposal.
    pub fn acceptance(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

/// Cluster value and sampling weight of a configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Signed cluster value.
    pub value: f64,
    /// Absolute sampling weight.
    pub weight: f64,
}

/// Result of one Metropolis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// Move attempted.
    pub kind: MoveKind,
    /// Whether the configuration changed.
    pub accepted: bool,
}

/// A Metropolis walk over one cluster's absolute weight.
#[derive(Debug)]
pub struct Ensemble {
    kind: EnsembleKind,
    configuration: Configuration,
    cluster: ClusterValue,
    sampling: SamplingWeight,
    params: SamplingParams,
    value: f64,
    weight: f64,
    steps: BTreeMap<MoveKind, f64>,
    tallies: BTreeMap<MoveKind, MoveTally>,
    selector: Vec<(MoveKind, f64)>,
    phase: Phase,
    rng: RngHandle,
    revision: u64,
}

impl Ensemble {
    /// Builds an ensemble and brings its configuration to a positive weight.
    pub fn new(
        kind: EnsembleKind,
        configuration: Configuration,
        cluster: ClusterValue,
        sampling: SamplingWeight,
        params: SamplingParams,
        rng: RngHandle,
    ) -> Result<Self, VirialError> {
        if cluster.points() != configuration.len() {
            return Err(VirialError::Configuration(
                ErrorInfo::new("point-mismatch", "cluster and configuration sizes differ")
                    .with_context("ensemble", kind.as_str())
                    .with_context("cluster", cluster.points().to_string())
                    .with_context("molecules", configuration.len().to_string()),
            ));
        }
        if let SamplingWeight::Umbrella { partners } = &sampling {
            if let Some((_, bad)) = partners.iter().find(|(_, c)| c.points() != cluster.points()) {
                return Err(VirialError::Configuration(
                    ErrorInfo::new("point-mismatch", "umbrella partner spans a different size")
                        .with_context("ensemble", kind.as_str())
                        .with_context("partner", bad.points().to_string()),
                ));
            }
        }
        let enabled = params.moves.enabled();
        if enabled.is_empty() {
            return Err(VirialError::configuration(
                "no-moves",
                "at least one move needs a positive frequency",
            ));
        }
        if enabled.iter().any(|(k, _)| k.is_ring_move())
            && (configuration.beads_per_molecule() < 2 || params.spring.is_none())
        {
            return Err(VirialError::Configuration(
                ErrorInfo::new("ring-move-classical", "ring moves need molecules with beads")
                    .with_context("ensemble", kind.as_str())
                    .with_context("beads", configuration.beads_per_molecule().to_string()),
            ));
        }
        let mut cumulative = 0.0;
        let selector = enabled
            .into_iter()
            .map(|(k, frequency)| {
                cumulative += frequency;
                (k, cumulative)
            })
            .collect();
        let steps = MoveKind::ALL
            .iter()
            .map(|&k| (k, params.moves.setting(k).step))
            .collect();
        let mut ensemble = Self {
            kind,
            configuration,
            cluster,
            sampling,
            params,
            value: 0.0,
            weight: 0.0,
            steps,
            tallies: BTreeMap::new(),
            selector,
            phase: Phase::Equilibrating,
            rng,
            revision: 0,
        };
        ensemble.initialize()?;
        Ok(ensemble)
    }

    fn initialize(&mut self) -> Result<(), VirialError> {
        let eval = self.evaluate(&self.configuration);
        self.value = eval.value;
        self.weight = eval.weight;
        let mut attempts = 0;
        while !(self.weight > 0.0 && self.weight.is_finite() && self.value.is_finite()) {
            if attempts == self.params.init_attempts {
                return Err(VirialError::DegenerateSampling(
                    ErrorInfo::new(
                        "degenerate-initial-configuration",
                        "initial configuration has zero sampling weight",
                    )
                    .with_context("ensemble", self.kind.as_str())
                    .with_context("attempts", attempts.to_string())
                    .with_hint("check for overlapping hard cores or a cluster that vanishes"),
                ));
            }
            attempts += 1;
            let step = self.steps.get(&MoveKind::Translate).copied().unwrap_or(1.0);
            let mut trial = moves_rigid::translate(&self.configuration, step, &mut self.rng).trial;
            if let Some(spring) = &self.params.spring {
                for _ in 0..trial.len() {
                    trial = moves_ring::regrow_full(&trial, spring, &mut self.rng).trial;
                }
            }
            let eval = self.evaluate(&trial);
            self.configuration = trial;
            self.value = eval.value;
            self.weight = eval.weight;
        }
        if attempts > 0 {
            tracing::debug!(
                "{} ensemble reached positive weight after {} unconditional moves",
                self.kind.as_str(),
                attempts
            );
        }
        Ok(())
    }

    /// Which ensemble this is.
    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Cluster whose absolute value the walk samples.
    pub fn cluster(&self) -> &ClusterValue {
        &self.cluster
    }

    /// Sampling parameters.
    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Cached signed cluster value of the current configuration.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Cached sampling weight of the current configuration.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Counter bumped on every accepted move.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Cluster value and sampling weight of an arbitrary configuration.
    pub fn evaluate(&self, config: &Configuration) -> Evaluation {
        let value = self.cluster.value(config, self.params.beta);
        let weight = self.sampling.weight(value, config, self.params.beta);
        Evaluation { value, weight }
    }

    /// Current step size of `kind`.
    pub fn step_size(&self, kind: MoveKind) -> f64 {
        self.steps.get(&kind).copied().unwrap_or(0.0)
    }

    /// Step sizes of the enabled moves keyed by move name.
    pub fn step_sizes(&self) -> BTreeMap<String, f64> {
        self.selector
            .iter()
            .map(|(kind, _)| (kind.as_str().to_string(), self.step_size(*kind)))
            .collect()
    }

    /// Per-move tallies.
    pub fn tallies(&self) -> &BTreeMap<MoveKind, MoveTally> {
        &self.tallies
    }

    /// Acceptance fraction of every attempted move kind.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        self.tallies
            .iter()
            .map(|(kind, tally)| (kind.as_str().to_string(), tally.acceptance()))
            .collect()
    }

    /// Freezes step sizes. Idempotent.
    pub fn begin_sampling(&mut self) {
        if self.phase == Phase::Equilibrating {
            tracing::info!(
                "{} ensemble sampling with steps {:?}",
                self.kind.as_str(),
                self.step_sizes()
            );
        }
        self.phase = Phase::Sampling;
    }

    fn select_move(&mut self) -> MoveKind {
        let total = self.selector.last().map(|(_, c)| *c).unwrap_or(0.0);
        let draw = self.rng.uniform() * total;
        self.selector
            .iter()
            .find(|(_, c)| draw < *c)
            .or_else(|| self.selector.last())
            .map(|(kind, _)| *kind)
            .unwrap_or(MoveKind::Translate)
    }

    /// One Metropolis step: select, propose, accept or reject.
    pub fn step(&mut self) -> Result<StepOutcome, VirialError> {
        let kind = self.select_move();
        let ctx = MoveContext {
            step: self.step_size(kind),
            beta: self.params.beta,
            spring: self.params.spring.as_ref(),
            partial_trials: self.params.partial_trials,
            regrow_bias: self.params.regrow_bias.as_deref(),
        };
        let record = moves::propose(kind, &self.configuration, &ctx, &mut self.rng)?;
        let accepted = match record {
            Some(record) => {
                let eval = self.evaluate(&record.trial);
                let probability = self.acceptance_probability(&eval, record.log_bias);
                if probability >= 1.0 || (probability > 0.0 && self.rng.uniform() < probability)
                {
                    self.configuration = record.trial;
                    self.value = eval.value;
                    self.weight = eval.weight;
                    self.revision += 1;
                    true
                } else {
                    tracing::trace!(
                        "{} rejected {} with probability {}",
                        self.kind.as_str(),
                        kind.as_str(),
                        probability
                    );
                    false
                }
            }
            None => {
                tracing::trace!("{} proposal {} failed", self.kind.as_str(), kind.as_str());
                false
            }
        };
        let tally = self.tallies.entry(kind).or_default();
        tally.record(accepted);
        let due = tally.window_proposed >= self.params.tuning.interval;
        if self.phase == Phase::Equilibrating && kind.is_tunable() && due {
            self.tune(kind);
        }
        Ok(StepOutcome { kind, accepted })
    }

    fn acceptance_probability(&self, eval: &Evaluation, log_bias: f64) -> f64 {
        if !(eval.value.is_finite() && eval.weight.is_finite() && log_bias.is_finite()) {
            return 0.0;
        }
        if eval.weight <= 0.0 {
            return 0.0;
        }
        eval.weight / self.weight * log_bias.exp()
    }

    fn tune(&mut self, kind: MoveKind) {
        let tuning = &self.params.tuning;
        let setting = self.params.moves.setting(kind);
        let (mut low, mut high) = (setting.min_step, setting.max_step);
        if kind == MoveKind::RingRegrowPartial {
            let arc_max = self.configuration.beads_per_molecule().saturating_sub(1).max(1) as f64;
            low = low.max(1.0);
            high = high.min(arc_max);
        }
        let Some(tally) = self.tallies.get_mut(&kind) else {
            return;
        };
        let rate = tally.window_accepted as f64 / tally.window_proposed as f64;
        tally.window_accepted = 0;
        tally.window_proposed = 0;
        let current = self.steps.get(&kind).copied().unwrap_or(setting.step);
        let proposed = if rate > tuning.target_acceptance {
            current * tuning.factor
        } else {
            current / tuning.factor
        };
        let next = proposed.clamp(low, high.max(low));
        if next != current {
            tracing::debug!(
                "{} {} acceptance {:.3}, step {:.4} -> {:.4}",
                self.kind.as_str(),
                kind.as_str(),
                rate,
                current,
                next
            );
        }
        self.steps.insert(kind, next);
    }
}
