//! Bennett overlap sampling over a reference and a target ensemble.
//!
//! Each macro cycle hands [`MICRO_STEPS`] Metropolis steps to one ensemble,
//! chosen with probability `p` for the reference. After every step the
//! ensemble records its cluster value over its sampling weight, any auxiliary
//! target observables, and the overlap function at every alpha under
//! consideration. The ratio of the two clusters' integrals is
//! `(<v_t>/<OS_t>) / (<v_r>/<OS_r>)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use virial_cluster::ClusterValue;
use virial_core::{ErrorInfo, RngHandle, VirialError};

use crate::accumulator::BlockAccumulator;
use crate::config::OverlapConfig;
use crate::ensemble::{Ensemble, EnsembleKind};
use crate::metrics::Histogram;

/// Metropolis steps per macro cycle.
pub const MICRO_STEPS: u64 = 1000;

/// Cooperative cancellation flag, checked between macro cycles.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Fresh handle with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop after the current macro cycle.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bennett overlap function for an ensemble whose other-to-self weight
/// ratio is `ratio`.
pub fn overlap_value(kind: EnsembleKind, ratio: f64, alpha: f64) -> f64 {
    match kind {
        EnsembleKind::Reference => ratio / (alpha + ratio),
        EnsembleKind::Target => ratio / (alpha * ratio + 1.0),
    }
}

/// Reference share of the effort minimizing the combined variance,
/// `sqrt(v_ref) / (sqrt(v_ref) + sqrt(v_tgt))`. Returns one half when both
/// variances vanish or either is not finite.
pub fn neyman_fraction(v_ref: f64, v_tgt: f64) -> f64 {
    let (a, b) = (v_ref.max(0.0).sqrt(), v_tgt.max(0.0).sqrt());
    let total = a + b;
    if !(total.is_finite() && total > 0.0) {
        return 0.5;
    }
    a / total
}

/// Ratio of the two integrals with its first-order error, plus the
/// per-ensemble factors it is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapEstimate {
    /// Alpha the estimate was taken at.
    pub alpha: f64,
    /// Target over reference integral ratio.
    pub ratio: f64,
    /// Standard error of `ratio`.
    pub error: f64,
    /// `<v_r> / <OS_r>`.
    pub reference_ratio: f64,
    /// Standard error of `reference_ratio`.
    pub reference_error: f64,
    /// `<v_t> / <OS_t>`.
    pub target_ratio: f64,
    /// Standard error of `target_ratio`.
    pub target_error: f64,
}

/// Ratio estimate of one auxiliary target observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableEstimate {
    /// Observable name.
    pub label: String,
    /// Observable integral over the reference integral.
    pub ratio: f64,
    /// Standard error of `ratio`.
    pub error: f64,
}

#[derive(Debug, Clone)]
struct CachedSample {
    revision: u64,
    sample: Vec<f64>,
    nonzero: bool,
}

/// Drives both ensembles and owns their accumulators.
#[derive(Debug)]
pub struct OverlapController {
    reference: Ensemble,
    target: Ensemble,
    extras: Vec<(String, ClusterValue)>,
    derivative_order: usize,
    alphas: Vec<f64>,
    block_size: u64,
    accumulators: [BlockAccumulator; 2],
    fraction: f64,
    pinned: bool,
    min_fraction: f64,
    adjust_interval: u64,
    cycles: [u64; 2],
    total_cycles: u64,
    samples: [u64; 2],
    nonzero: [u64; 2],
    cache: [Option<CachedSample>; 2],
    histogram: Option<Histogram>,
    rng: RngHandle,
}

impl OverlapController {
    /// Pairs a reference and a target ensemble.
    ///
    /// `extras` are recorded on the target as `value / pi_t` next to the
    /// first `derivative_order` beta derivatives of the target cluster.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: Ensemble,
        target: Ensemble,
        extras: Vec<(String, ClusterValue)>,
        derivative_order: usize,
        block_size: u64,
        overlap: &OverlapConfig,
        histogram: Option<Histogram>,
        rng: RngHandle,
    ) -> Result<Self, VirialError> {
        if reference.kind() != EnsembleKind::Reference || target.kind() != EnsembleKind::Target {
            return Err(VirialError::configuration(
                "ensemble-roles",
                "controller needs a reference and a target ensemble in that order",
            ));
        }
        let points = target.cluster().points();
        if let Some((label, _)) = extras.iter().find(|(_, c)| c.points() != points) {
            return Err(VirialError::Configuration(
                ErrorInfo::new("point-mismatch", "auxiliary observable spans a different size")
                    .with_context("observable", label.clone()),
            ));
        }
        let alphas = vec![1.0];
        let accumulators = [
            BlockAccumulator::new(1 + alphas.len(), block_size)?,
            BlockAccumulator::new(1 + extras.len() + derivative_order + alphas.len(), block_size)?,
        ];
        let (fraction, pinned) = match overlap.reference_fraction {
            Some(p) => (p, true),
            None => (overlap.initial_fraction, false),
        };
        Ok(Self {
            reference,
            target,
            extras,
            derivative_order,
            alphas,
            block_size,
            accumulators,
            fraction,
            pinned,
            min_fraction: overlap.min_fraction,
            adjust_interval: overlap.adjust_interval.max(1),
            cycles: [0; 2],
            total_cycles: 0,
            samples: [0; 2],
            nonzero: [0; 2],
            cache: [None, None],
            histogram,
            rng,
        })
    }

    /// The reference ensemble.
    pub fn reference(&self) -> &Ensemble {
        &self.reference
    }

    /// The target ensemble.
    pub fn target(&self) -> &Ensemble {
        &self.target
    }

    /// Ensemble of `kind`.
    pub fn ensemble(&self, kind: EnsembleKind) -> &Ensemble {
        match kind {
            EnsembleKind::Reference => &self.reference,
            EnsembleKind::Target => &self.target,
        }
    }

    /// Accumulator of `kind`.
    pub fn accumulator(&self, kind: EnsembleKind) -> &BlockAccumulator {
        &self.accumulators[kind.index()]
    }

    /// Alphas currently recorded.
    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Current reference fraction.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// True when the fraction never changes.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Macro cycles given to `kind` since the last statistics reset.
    pub fn cycles(&self, kind: EnsembleKind) -> u64 {
        self.cycles[kind.index()]
    }

    /// Macro cycles since the last statistics reset.
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Histogram of the target's molecule 0 to 1 distance, when recorded.
    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    /// Labels of the auxiliary target observables, derivatives last.
    pub fn observable_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.extras.iter().map(|(l, _)| l.clone()).collect();
        labels.extend((1..=self.derivative_order).map(|k| format!("beta-derivative-{k}")));
        labels
    }

    fn overlap_offset(&self, kind: EnsembleKind) -> usize {
        match kind {
            EnsembleKind::Reference => 1,
            EnsembleKind::Target => 1 + self.extras.len() + self.derivative_order,
        }
    }

    /// Overrides the reference fraction. Ignored when pinned.
    pub fn set_fraction(&mut self, fraction: f64) {
        if !self.pinned {
            self.fraction = fraction.clamp(self.min_fraction, 1.0 - self.min_fraction);
        }
    }

    /// Records the overlap function at `alphas` from now on and discards
    /// collected statistics.
    pub fn set_alphas(&mut self, alphas: Vec<f64>) -> Result<(), VirialError> {
        if alphas.is_empty() || alphas.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(VirialError::DegenerateSampling(
                ErrorInfo::new("alpha-not-finite", "alphas must be finite and positive")
                    .with_context("alphas", format!("{alphas:?}")),
            ));
        }
        let target_dim = 1 + self.extras.len() + self.derivative_order + alphas.len();
        self.accumulators = [
            BlockAccumulator::new(1 + alphas.len(), self.block_size)?,
            BlockAccumulator::new(target_dim, self.block_size)?,
        ];
        self.alphas = alphas;
        self.cache = [None, None];
        self.reset_statistics();
        Ok(())
    }

    /// Discards every collected sample while keeping configurations and
    /// step sizes.
    pub fn reset_statistics(&mut self) {
        for accumulator in &mut self.accumulators {
            accumulator.reset();
        }
        self.cycles = [0; 2];
        self.total_cycles = 0;
        self.samples = [0; 2];
        self.nonzero = [0; 2];
        if let Some(histogram) = &mut self.histogram {
            histogram.reset();
        }
    }

    /// Freezes step sizes of both ensembles.
    pub fn begin_sampling(&mut self) {
        self.reference.begin_sampling();
        self.target.begin_sampling();
    }

    /// Runs one macro cycle on `kind`.
    pub fn advance(&mut self, kind: EnsembleKind) -> Result<(), VirialError> {
        let offset = self.overlap_offset(kind);
        let slot = kind.index();
        let (this, other) = match kind {
            EnsembleKind::Reference => (&mut self.reference, &self.target),
            EnsembleKind::Target => (&mut self.target, &self.reference),
        };
        for _ in 0..MICRO_STEPS {
            this.step()?;
            let stale = self.cache[slot]
                .as_ref()
                .map(|c| c.revision != this.revision())
                .unwrap_or(true);
            if stale {
                self.cache[slot] = Some(observe(
                    this,
                    other,
                    &self.extras,
                    self.derivative_order,
                    &self.alphas,
                    offset,
                ));
            }
            if let Some(cached) = &self.cache[slot] {
                self.accumulators[slot].push(&cached.sample)?;
                self.samples[slot] += 1;
                if cached.nonzero {
                    self.nonzero[slot] += 1;
                }
            }
            if kind == EnsembleKind::Target {
                if let Some(histogram) = &mut self.histogram {
                    if this.configuration().len() > 1 {
                        histogram.push(this.configuration().separation_sq(0, 1).sqrt());
                    }
                }
            }
        }
        self.cycles[slot] += 1;
        Ok(())
    }

    /// Runs up to `cycles` macro cycles, choosing the ensemble of each by
    /// the reference fraction and re-estimating the fraction every
    /// `adjust_interval` cycles. Returns the number of cycles run, which is
    /// short of `cycles` only when `stop` was raised.
    pub fn run_cycles(&mut self, cycles: u64, stop: &StopHandle) -> Result<u64, VirialError> {
        for done in 0..cycles {
            if stop.is_stop_requested() {
                return Ok(done);
            }
            let kind = if self.rng.uniform() < self.fraction {
                EnsembleKind::Reference
            } else {
                EnsembleKind::Target
            };
            self.advance(kind)?;
            self.total_cycles += 1;
            if !self.pinned && self.total_cycles % self.adjust_interval == 0 {
                self.adjust_fraction()?;
            }
        }
        Ok(cycles)
    }

    fn reporting_alpha(&self) -> usize {
        self.alphas.len() / 2
    }

    fn relative_error(&self, kind: EnsembleKind, alpha_index: usize) -> f64 {
        let column = self.overlap_offset(kind) + alpha_index;
        let (ratio, error) = self.accumulators[kind.index()].ratio_error(0, column);
        let relative = (error / ratio).abs();
        if relative.is_nan() || relative > 1.0 {
            1.0
        } else {
            relative
        }
    }

    /// Neyman re-estimate of the reference fraction from the current
    /// per-ensemble errors. A no-op until both ensembles hold two blocks.
    pub fn adjust_fraction(&mut self) -> Result<(), VirialError> {
        self.check_overlap()?;
        if self.pinned || self.accumulators.iter().any(|a| a.blocks() < 2) {
            return Ok(());
        }
        let index = self.reporting_alpha();
        let v_ref = self.relative_error(EnsembleKind::Reference, index).powi(2)
            * self.cycles[EnsembleKind::Reference.index()] as f64;
        let v_tgt = self.relative_error(EnsembleKind::Target, index).powi(2)
            * self.cycles[EnsembleKind::Target.index()] as f64;
        let next = neyman_fraction(v_ref, v_tgt).clamp(self.min_fraction, 1.0 - self.min_fraction);
        tracing::debug!(
            "reference fraction {:.4} -> {:.4} (v_ref {:.3e}, v_tgt {:.3e})",
            self.fraction,
            next,
            v_ref,
            v_tgt
        );
        self.fraction = next;
        Ok(())
    }

    /// Fails when an ensemble has samples but never saw a non-zero overlap.
    pub fn check_overlap(&self) -> Result<(), VirialError> {
        for kind in [EnsembleKind::Reference, EnsembleKind::Target] {
            let slot = kind.index();
            if self.samples[slot] > 0 && self.nonzero[slot] == 0 {
                return Err(VirialError::DegenerateSampling(
                    ErrorInfo::new("zero-overlap", "every overlap value was zero or NaN")
                        .with_context("ensemble", kind.as_str())
                        .with_context("samples", self.samples[slot].to_string())
                        .with_hint("widen the reference system so the two ensembles overlap"),
                ));
            }
        }
        Ok(())
    }

    fn require_samples(&self) -> Result<(), VirialError> {
        self.check_overlap()?;
        for kind in [EnsembleKind::Reference, EnsembleKind::Target] {
            if self.samples[kind.index()] == 0 {
                return Err(VirialError::DegenerateSampling(
                    ErrorInfo::new("no-samples", "an ensemble collected no samples")
                        .with_context("ensemble", kind.as_str()),
                ));
            }
        }
        Ok(())
    }

    /// Mean overlap function per alpha for `kind`.
    pub fn overlap_means(&self, kind: EnsembleKind) -> Vec<f64> {
        let offset = self.overlap_offset(kind);
        let mean = self.accumulators[kind.index()].mean();
        mean[offset..offset + self.alphas.len()].to_vec()
    }

    /// Self-consistent alpha implied by the data, `<OS_r> / <OS_t>`, at the
    /// reporting alpha.
    pub fn alpha_estimate(&self) -> Result<f64, VirialError> {
        self.require_samples()?;
        let index = self.reporting_alpha();
        let r = self.overlap_means(EnsembleKind::Reference)[index];
        let t = self.overlap_means(EnsembleKind::Target)[index];
        Ok(r / t)
    }

    /// `<v> / <OS>` of `kind` at `alpha_index` with its error.
    pub fn ensemble_ratio(&self, kind: EnsembleKind, alpha_index: usize) -> (f64, f64) {
        let column = self.overlap_offset(kind) + alpha_index;
        self.accumulators[kind.index()].ratio_error(0, column)
    }

    /// Integral ratio at the reporting alpha.
    pub fn estimate(&self) -> Result<OverlapEstimate, VirialError> {
        self.require_samples()?;
        let index = self.reporting_alpha();
        let (reference_ratio, reference_error) = self.ensemble_ratio(EnsembleKind::Reference, index);
        let (target_ratio, target_error) = self.ensemble_ratio(EnsembleKind::Target, index);
        let ratio = target_ratio / reference_ratio;
        let relative = (reference_error / reference_ratio).powi(2)
            + (target_error / target_ratio).powi(2);
        Ok(OverlapEstimate {
            alpha: self.alphas[index],
            ratio,
            error: ratio.abs() * relative.sqrt(),
            reference_ratio,
            reference_error,
            target_ratio,
            target_error,
        })
    }

    /// Ratio estimates of every auxiliary target observable.
    pub fn observable_estimates(&self) -> Result<Vec<ObservableEstimate>, VirialError> {
        self.require_samples()?;
        let index = self.reporting_alpha();
        let (reference_ratio, reference_error) = self.ensemble_ratio(EnsembleKind::Reference, index);
        let reference_relative = (reference_error / reference_ratio).powi(2);
        let column = self.overlap_offset(EnsembleKind::Target) + index;
        let accumulator = &self.accumulators[EnsembleKind::Target.index()];
        Ok(self
            .observable_labels()
            .into_iter()
            .enumerate()
            .map(|(i, label)| {
                let (target_ratio, target_error) = accumulator.ratio_error(1 + i, column);
                let ratio = target_ratio / reference_ratio;
                let relative = reference_relative + (target_error / target_ratio).powi(2);
                ObservableEstimate {
                    label,
                    ratio,
                    error: ratio.abs() * relative.sqrt(),
                }
            })
            .collect())
    }
}

fn observe(
    this: &Ensemble,
    other: &Ensemble,
    extras: &[(String, ClusterValue)],
    derivative_order: usize,
    alphas: &[f64],
    offset: usize,
) -> CachedSample {
    let kind = this.kind();
    let config = this.configuration();
    let weight = this.weight();
    let mut sample = Vec::with_capacity(offset + alphas.len());
    sample.push(this.value() / weight);
    if kind == EnsembleKind::Target {
        let beta = this.params().beta;
        for (_, cluster) in extras {
            sample.push(cluster.value(config, beta) / weight);
        }
        if derivative_order > 0 {
            let series = this.cluster().series(config, beta, derivative_order);
            sample.extend(series.iter().skip(1).map(|d| d / weight));
        }
    }
    let mut ratio = other.evaluate(config).weight / weight;
    let nonzero = ratio.is_finite() && ratio > 0.0;
    if !ratio.is_finite() {
        ratio = 0.0;
    }
    sample.extend(alphas.iter().map(|&alpha| overlap_value(kind, ratio, alpha)));
    CachedSample {
        revision: this.revision(),
        sample,
        nonzero,
    }
}
