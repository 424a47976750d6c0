use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use virial_cluster::{ClusterValue, PairPotential};
use virial_core::{Boundary, Configuration, ErrorInfo, VirialError};

use crate::calibration::{self, CalibrationOutcome};
use crate::checkpoint::{Additivity, RefPref, RefPrefKey};
use crate::config::RunConfig;
use crate::determinism;
use crate::ensemble::{Ensemble, EnsembleKind, SamplingParams, SamplingWeight};
use crate::manifest::{self, RunManifest};
use crate::metrics::{Histogram, HistogramBin};
use crate::overlap::{OverlapController, StopHandle};

/// The two clusters of an overlap run and everything that shapes their
/// walks beyond the run configuration.
#[derive(Debug, Clone)]
pub struct VirialSystem {
    reference: ClusterValue,
    target: ClusterValue,
    reference_integral: f64,
    extras: Vec<(String, ClusterValue)>,
    boundary: Boundary,
    target_weight: SamplingWeight,
    regrow_bias: Option<Arc<dyn PairPotential>>,
    initial: Option<Configuration>,
}

impl VirialSystem {
    /// A reference cluster with known integral `reference_integral` and the
    /// target cluster to measure against it.
    pub fn new(
        reference: ClusterValue,
        target: ClusterValue,
        reference_integral: f64,
    ) -> Result<Self, VirialError> {
        if reference.points() != target.points() {
            return Err(VirialError::Configuration(
                ErrorInfo::new("point-mismatch", "reference and target span different sizes")
                    .with_context("reference", reference.points().to_string())
                    .with_context("target", target.points().to_string()),
            ));
        }
        if !(reference_integral.is_finite() && reference_integral != 0.0) {
            return Err(VirialError::Configuration(
                ErrorInfo::new("reference-integral", "reference integral must be finite and non-zero")
                    .with_context("value", reference_integral.to_string()),
            ));
        }
        Ok(Self {
            reference,
            target,
            reference_integral,
            extras: Vec::new(),
            boundary: Boundary::Open,
            target_weight: SamplingWeight::Absolute,
            regrow_bias: None,
            initial: None,
        })
    }

    /// Records `cluster` on the target walk and reports its integral.
    pub fn with_observable(mut self, label: impl Into<String>, cluster: ClusterValue) -> Self {
        self.extras.push((label.into(), cluster));
        self
    }

    /// Samples inside `boundary` instead of open space.
    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Samples the target with `weight` instead of its own absolute value.
    pub fn with_target_weight(mut self, weight: SamplingWeight) -> Self {
        self.target_weight = weight;
        self
    }

    /// Biases partial ring regrowth with `potential`.
    pub fn with_regrow_bias(mut self, potential: Arc<dyn PairPotential>) -> Self {
        self.regrow_bias = Some(potential);
        self
    }

    /// Starts both walks from `configuration` instead of all molecules on
    /// the origin.
    pub fn with_initial_configuration(mut self, configuration: Configuration) -> Self {
        self.initial = Some(configuration);
        self
    }
}

/// Per-ensemble summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleReport {
    /// Samples collected during production.
    pub samples: u64,
    /// Macro cycles run during production.
    pub cycles: u64,
    /// `<v> / <OS>`.
    pub ratio: f64,
    /// Standard error of `ratio`.
    pub ratio_error: f64,
    /// Mean of `value / weight`.
    pub mean_value: f64,
    /// Standard error of `mean_value`.
    pub value_error: f64,
    /// Mean overlap function.
    pub mean_overlap: f64,
    /// Standard error of `mean_overlap`.
    pub overlap_error: f64,
    /// Lag-one correlation of the `value / weight` block means.
    pub block_correlation: f64,
    /// Acceptance fraction per move.
    pub acceptance: BTreeMap<String, f64>,
    /// Final step size per move.
    pub step_sizes: BTreeMap<String, f64>,
}

/// Integral of one auxiliary observable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservableResult {
    /// Ratio to the reference integral.
    pub ratio: f64,
    /// Standard error of `ratio`.
    pub ratio_error: f64,
    /// `ratio` times the reference integral.
    pub value: f64,
    /// Standard error of `value`.
    pub value_error: f64,
}

/// Final estimates of an overlap run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirialResult {
    /// Target over reference integral.
    pub ratio: f64,
    /// Standard error of `ratio`.
    pub ratio_error: f64,
    /// Target integral, `ratio` times the reference integral.
    pub value: f64,
    /// Standard error of `value`.
    pub value_error: f64,
    /// Known reference integral.
    pub reference_integral: f64,
    /// Alpha used during production.
    pub alpha: f64,
    /// Alpha the production data imply.
    pub alpha_estimate: f64,
    /// Reference fraction at the end of the run.
    pub reference_fraction: f64,
    /// Production macro cycles run.
    pub cycles: u64,
    /// True when a stop request cut production short.
    pub stopped_early: bool,
    /// Reference ensemble summary.
    pub reference: EnsembleReport,
    /// Target ensemble summary.
    pub target: EnsembleReport,
    /// Auxiliary target observables and beta derivatives, in record order.
    pub observables: IndexMap<String, ObservableResult>,
    /// Block covariance of the target samples.
    pub covariance: Vec<Vec<f64>>,
    /// Block correlation of the target samples.
    pub correlation: Vec<Vec<f64>>,
    /// Target distance histogram, when recorded.
    pub histogram: Option<Vec<HistogramBin>>,
    /// SHA-256 of the run configuration.
    pub config_hash: String,
}

/// A run in progress: both ensembles under one controller.
#[derive(Debug)]
pub struct Simulation {
    config: RunConfig,
    controller: OverlapController,
    reference_integral: f64,
    refpref_path: Option<PathBuf>,
    stop: StopHandle,
    calibration: Option<CalibrationOutcome>,
    config_hash: String,
    production_cycles: u64,
    stopped_early: bool,
}

impl Simulation {
    /// Builds both ensembles and the controller.
    pub fn new(config: &RunConfig, system: VirialSystem) -> Result<Self, VirialError> {
        config.validate()?;
        let mut params = SamplingParams::from_config(config)?;
        if let Some(bias) = system.regrow_bias.clone() {
            params = params.with_regrow_bias(bias);
        }
        let points = system.target.points();
        let configuration = match system.initial.clone() {
            Some(initial) => {
                if initial.len() != points || initial.beads_per_molecule() != config.beads {
                    return Err(VirialError::Configuration(
                        ErrorInfo::new("initial-shape", "initial configuration does not fit the run")
                            .with_context("molecules", initial.len().to_string())
                            .with_context("beads", initial.beads_per_molecule().to_string()),
                    ));
                }
                initial
            }
            None => Configuration::new(points, config.beads, system.boundary)?,
        };
        let seed = config.seed_policy.master_seed;
        let reference = Ensemble::new(
            EnsembleKind::Reference,
            configuration.clone(),
            system.reference,
            SamplingWeight::Absolute,
            params.clone(),
            determinism::ensemble_rng(seed, EnsembleKind::Reference),
        )?;
        let additivity = if system.target.has_triples() {
            Additivity::ThreeBody
        } else {
            Additivity::Unspecified
        };
        let target = Ensemble::new(
            EnsembleKind::Target,
            configuration,
            system.target,
            system.target_weight,
            params,
            determinism::ensemble_rng(seed, EnsembleKind::Target),
        )?;
        let histogram = config
            .histogram
            .enabled
            .then(|| Histogram::new(config.histogram.bins, config.histogram.max_distance));
        let controller = OverlapController::new(
            reference,
            target,
            system.extras,
            config.derivative_order,
            config.block_size,
            &config.overlap,
            histogram,
            determinism::controller_rng(seed),
        )?;
        let refpref_path = config.checkpoint.directory.as_ref().map(|dir| {
            RefPrefKey {
                points,
                additivity,
                temperature: config.temperature,
                beads: config.beads,
                mode: config.checkpoint.mode,
                tag: config.checkpoint.tag.clone(),
            }
            .path(dir)
        });
        Ok(Self {
            config: config.clone(),
            controller,
            reference_integral: system.reference_integral,
            refpref_path,
            stop: StopHandle::new(),
            calibration: None,
            config_hash: manifest::config_hash(config)?,
            production_cycles: 0,
            stopped_early: false,
        })
    }

    /// Handle that stops the run at the next macro-cycle boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The controller, for inspection.
    pub fn controller(&self) -> &OverlapController {
        &self.controller
    }

    /// refpref file this run reads and writes, if any.
    pub fn refpref_path(&self) -> Option<&PathBuf> {
        self.refpref_path.as_ref()
    }

    /// Equilibrates, settles alpha and switches both ensembles to sampling.
    ///
    /// A stop request during calibration is not an error: the outcome is
    /// marked `stopped` and carries the starting alpha.
    pub fn calibrate(&mut self) -> Result<CalibrationOutcome, VirialError> {
        let settings = self.config.calibration.clone();
        let stored = self.refpref_path.as_deref().and_then(RefPref::load);
        let reused = stored.filter(|_| self.config.checkpoint.reuse_alpha);
        let equilibrated = calibration::equilibrate(
            &mut self.controller,
            settings.equilibration_cycles(self.config.steps),
            &self.stop,
        )?;
        let outcome = match reused {
            Some(refpref) => {
                tracing::info!("alpha {:.6e} taken from refpref checkpoint", refpref.alpha);
                CalibrationOutcome {
                    alpha: refpref.alpha,
                    from_checkpoint: true,
                    rounds: 0,
                    stopped: !equilibrated,
                }
            }
            None if !equilibrated => CalibrationOutcome {
                alpha: settings.alpha_center,
                from_checkpoint: false,
                rounds: 0,
                stopped: true,
            },
            None => match calibration::search_alpha(
                &mut self.controller,
                &settings,
                settings.alpha_cycles(self.config.steps),
                &self.stop,
            )? {
                Some((alpha, rounds)) => CalibrationOutcome {
                    alpha,
                    from_checkpoint: false,
                    rounds,
                    stopped: false,
                },
                None => CalibrationOutcome {
                    alpha: settings.alpha_center,
                    from_checkpoint: false,
                    rounds: 0,
                    stopped: true,
                },
            },
        };
        if let Some(fraction) = stored.and_then(|refpref| refpref.fraction) {
            self.controller.set_fraction(fraction);
        }
        self.controller.set_alphas(vec![outcome.alpha])?;
        self.controller.begin_sampling();
        self.stopped_early = outcome.stopped;
        self.calibration = Some(outcome);
        Ok(outcome)
    }

    /// Production macro cycles run so far.
    pub fn production_cycles(&self) -> u64 {
        self.production_cycles
    }

    /// Runs up to `cycles` more production cycles, never past the configured
    /// budget, calibrating first if needed. Returns the cycles run, which is
    /// short of the request only when a stop was raised.
    pub fn advance_production(&mut self, cycles: u64) -> Result<u64, VirialError> {
        if self.calibration.is_none() {
            self.calibrate()?;
        }
        let wanted = cycles.min(self.config.cycles().saturating_sub(self.production_cycles));
        let ran = self.controller.run_cycles(wanted, &self.stop)?;
        self.production_cycles += ran;
        if ran < wanted {
            self.stopped_early = true;
        }
        Ok(ran)
    }

    /// Runs the remaining production cycles in chunks of `report_interval`,
    /// logging progress after each, and stores the refpref checkpoint when
    /// the run completes.
    pub fn run_production(&mut self) -> Result<VirialResult, VirialError> {
        if self.calibration.is_none() {
            self.calibrate()?;
        }
        let total = self.config.cycles();
        while self.production_cycles < total {
            let chunk = self
                .config
                .report_interval
                .min(total.saturating_sub(self.production_cycles));
            let ran = self.advance_production(chunk)?;
            let done = self.production_cycles;
            if ran < chunk {
                tracing::info!("stop requested after {} of {} cycles", done, total);
                break;
            }
            self.controller.check_overlap()?;
            if let Ok(estimate) = self.controller.estimate() {
                tracing::info!(
                    "cycle {}/{} ratio {:.6e} +/- {:.3e} reference fraction {:.4}",
                    done,
                    total,
                    estimate.ratio,
                    estimate.error,
                    self.controller.fraction()
                );
            }
        }
        let result = self.result()?;
        if let (Some(path), false) = (&self.refpref_path, self.stopped_early) {
            RefPref {
                alpha: result.alpha,
                fraction: Some(result.reference_fraction),
            }
            .store(path)?;
        }
        Ok(result)
    }

    fn report(&self, kind: EnsembleKind) -> EnsembleReport {
        let controller = &self.controller;
        let accumulator = controller.accumulator(kind);
        let ensemble = controller.ensemble(kind);
        let (ratio, ratio_error) = controller.ensemble_ratio(kind, 0);
        let overlap_column = accumulator.dimension() - controller.alphas().len();
        let mean = accumulator.mean();
        let errors = accumulator.std_error();
        EnsembleReport {
            samples: accumulator.samples(),
            cycles: controller.cycles(kind),
            ratio,
            ratio_error,
            mean_value: mean[0],
            value_error: errors[0],
            mean_overlap: mean[overlap_column],
            overlap_error: errors[overlap_column],
            block_correlation: accumulator.block_correlation()[0],
            acceptance: ensemble.acceptance_rates(),
            step_sizes: ensemble.step_sizes(),
        }
    }

    /// Estimates from the statistics collected so far.
    pub fn result(&self) -> Result<VirialResult, VirialError> {
        if self.stopped_early {
            for kind in [EnsembleKind::Reference, EnsembleKind::Target] {
                if self.controller.accumulator(kind).samples() == 0 {
                    return Err(VirialError::Interrupted(
                        ErrorInfo::new(
                            "stopped-before-samples",
                            "run stopped before both ensembles sampled",
                        )
                        .with_context("ensemble", kind.as_str())
                        .with_context("cycles", self.production_cycles.to_string()),
                    ));
                }
            }
        }
        let estimate = self.controller.estimate()?;
        let integral = self.reference_integral;
        let observables = self
            .controller
            .observable_estimates()?
            .into_iter()
            .map(|obs| {
                let result = ObservableResult {
                    ratio: obs.ratio,
                    ratio_error: obs.error,
                    value: obs.ratio * integral,
                    value_error: obs.error * integral.abs(),
                };
                (obs.label, result)
            })
            .collect();
        let target = self.controller.accumulator(EnsembleKind::Target);
        Ok(VirialResult {
            ratio: estimate.ratio,
            ratio_error: estimate.error,
            value: estimate.ratio * integral,
            value_error: estimate.error * integral.abs(),
            reference_integral: integral,
            alpha: estimate.alpha,
            alpha_estimate: self.controller.alpha_estimate()?,
            reference_fraction: self.controller.fraction(),
            cycles: self.controller.total_cycles(),
            stopped_early: self.stopped_early,
            reference: self.report(EnsembleKind::Reference),
            target: self.report(EnsembleKind::Target),
            observables,
            covariance: target.covariance(),
            correlation: target.correlation(),
            histogram: self.controller.histogram().map(Histogram::bins),
            config_hash: self.config_hash.clone(),
        })
    }

    /// Writes the manifest and histogram under the configured run
    /// directory. Does nothing without one.
    pub fn write_outputs(&self, result: &VirialResult) -> Result<Option<PathBuf>, VirialError> {
        let Some(root) = &self.config.output.run_directory else {
            return Ok(None);
        };
        let manifest_path = root.join(&self.config.output.manifest_file);
        RunManifest::new(&self.config, result.clone()).write(&manifest_path)?;
        if let Some(histogram) = self.controller.histogram() {
            histogram.write_csv(&root.join(&self.config.output.histogram_file))?;
        }
        Ok(Some(manifest_path))
    }
}

/// Calibrates and runs `system` under `config`, writing the refpref
/// checkpoint and run artefacts where configured.
pub fn run(config: &RunConfig, system: VirialSystem) -> Result<VirialResult, VirialError> {
    let mut simulation = Simulation::new(config, system)?;
    let outcome = simulation.calibrate()?;
    tracing::info!(
        "calibrated: alpha {:.6e}{}",
        outcome.alpha,
        if outcome.from_checkpoint { " (checkpoint)" } else { "" }
    );
    let result = simulation.run_production()?;
    simulation.write_outputs(&result)?;
    tracing::info!(
        "ratio {:.6e} +/- {:.3e}, value {:.6e} +/- {:.3e}",
        result.ratio,
        result.ratio_error,
        result.value,
        result.value_error
    );
    Ok(result)
}
